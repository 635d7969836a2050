use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument, warn};

use crate::{
    arguments::ResolvedArgs,
    context::Context,
    datasources::{compose_url, http_json::build_client, DataSource, Instruction},
    error::DataSourceError,
    json_writer, projection,
};

/// Upstreams that speak GraphQL over HTTP. Recognized arguments: `host`,
/// `url`, `query`; every other argument is sent as a GraphQL variable of
/// the query. The response envelope is unwrapped so plan paths descend
/// straight into the `data` value.
pub struct GraphQLDataSource {
    http_client: reqwest::Client,
}

const RESERVED_ARGS: &[&[u8]] = &[b"host", b"url", b"query", b"method"];

impl Default for GraphQLDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphQLDataSource {
    pub fn new() -> Self {
        GraphQLDataSource {
            http_client: build_client(),
        }
    }

    fn build_request_body(
        query: &[u8],
        args: &ResolvedArgs,
    ) -> Result<Vec<u8>, DataSourceError> {
        let query = std::str::from_utf8(query).map_err(|error| {
            DataSourceError::InvalidArgument("query", error.to_string())
        })?;
        let mut body = Vec::with_capacity(query.len() + 64);
        body.extend_from_slice(b"{\"query\":");
        json_writer::write_and_escape_string(&mut body, query);

        let mut first_variable = true;
        for pair in args.iter() {
            if RESERVED_ARGS.contains(&pair.key.as_ref()) {
                continue;
            }
            if first_variable {
                body.extend_from_slice(b",\"variables\":{");
                first_variable = false;
            } else {
                body.push(b',');
            }
            json_writer::write_and_escape_string(&mut body, &String::from_utf8_lossy(&pair.key));
            body.push(b':');
            // Raw JSON values pass through untouched; anything else is sent
            // as a string.
            if sonic_rs::from_slice::<sonic_rs::Value>(&pair.value).is_ok() {
                body.extend_from_slice(&pair.value);
            } else {
                json_writer::write_and_escape_string(
                    &mut body,
                    &String::from_utf8_lossy(&pair.value),
                );
            }
        }
        if !first_variable {
            body.push(b'}');
        }
        body.push(b'}');
        Ok(body)
    }
}

#[async_trait]
impl DataSource for GraphQLDataSource {
    #[instrument(level = "debug", skip_all, name = "GraphQLDataSource::resolve")]
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
        let query = args
            .by_key(b"query")
            .ok_or(DataSourceError::MissingArgument("query"))?;
        let url = compose_url(host, url_arg);
        let request_body = Self::build_request_body(query, args)?;

        debug!(url = %url, "dispatching GraphQL request");

        let exchange = async {
            let response = self
                .http_client
                .post(url.as_str())
                .header(CONTENT_TYPE, "application/json")
                .body(request_body)
                .send()
                .await
                .map_err(|error| {
                    DataSourceError::RequestFailure(url.clone(), error.to_string())
                })?;
            response
                .bytes()
                .await
                .map_err(|error| DataSourceError::RequestFailure(url.clone(), error.to_string()))
        };

        let body = tokio::select! {
            _ = ctx.cancelled() => return Ok(Instruction::CloseConnection),
            result = exchange => result?,
        };

        match projection::select(&body, &["data".to_string()]) {
            Some((data, kind)) if kind != projection::JsonKind::Null => {
                out.extend_from_slice(&data);
            }
            _ => {
                warn!(url = %url, "GraphQL response carries no data envelope");
            }
        }
        Ok(Instruction::CloseConnectionIfNotStream)
    }
}
