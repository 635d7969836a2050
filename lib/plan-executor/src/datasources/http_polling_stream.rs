use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

use crate::{
    arguments::ResolvedArgs,
    context::Context,
    datasources::{compose_url, http_json::build_client, DataSource, Instruction},
    error::DataSourceError,
};

/// Long-poll upstream for subscriptions. Each `resolve` call delivers the
/// next frame: the upstream is polled (paced by `delay`) until the body
/// differs from the previously delivered one, so unchanged responses never
/// reach clients. Cancellation short-circuits the poll loop with
/// `CloseConnection`.
pub struct HttpPollingStreamDataSource {
    http_client: reqwest::Client,
    delay: Duration,
    last_response: Mutex<Option<Bytes>>,
}

impl HttpPollingStreamDataSource {
    pub fn new(delay: Duration) -> Self {
        HttpPollingStreamDataSource {
            http_client: build_client(),
            delay,
            last_response: Mutex::new(None),
        }
    }

    async fn poll(&self, url: &str) -> Result<Bytes, DataSourceError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|error| DataSourceError::RequestFailure(url.to_string(), error.to_string()))?;
        response
            .bytes()
            .await
            .map_err(|error| DataSourceError::RequestFailure(url.to_string(), error.to_string()))
    }
}

#[async_trait]
impl DataSource for HttpPollingStreamDataSource {
    #[instrument(level = "debug", skip_all, name = "HttpPollingStreamDataSource::resolve")]
    async fn resolve(
        &self,
        ctx: &Context,
        args: &ResolvedArgs,
        out: &mut Vec<u8>,
    ) -> Result<Instruction, DataSourceError> {
        let host = args
            .by_key(b"host")
            .ok_or(DataSourceError::MissingArgument("host"))?;
        let url_arg = args
            .by_key(b"url")
            .ok_or(DataSourceError::MissingArgument("url"))?;
        let url = compose_url(host, url_arg);

        debug!(url = %url, "entering poll loop");

        let mut first_poll = true;
        loop {
            if ctx.is_cancelled() {
                return Ok(Instruction::CloseConnection);
            }
            if !first_poll {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok(Instruction::CloseConnection),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            first_poll = false;

            let body = tokio::select! {
                _ = ctx.cancelled() => return Ok(Instruction::CloseConnection),
                result = self.poll(&url) => result?,
            };

            let mut last_response = self.last_response.lock().await;
            if last_response.as_deref() != Some(body.as_ref()) {
                out.extend_from_slice(&body);
                *last_response = Some(body);
                return Ok(Instruction::Continue);
            }
            trace!("upstream frame unchanged, polling again");
        }
    }
}
