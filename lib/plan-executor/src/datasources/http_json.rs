use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument, warn};

use crate::{
    arguments::ResolvedArgs,
    context::Context,
    datasources::{compose_url, DataSource, Instruction},
    error::DataSourceError,
    projection,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_IDLE_CONNS_PER_HOST: usize = 1024;

/// REST/JSON upstream. Recognized arguments: `host`, `url`, `method`
/// (default GET), `body`, `headers` (JSON object), `__typename` (status
/// code to type name mapping, with a `defaultTypeName` fallback).
pub struct HttpJsonDataSource {
    http_client: reqwest::Client,
}

impl Default for HttpJsonDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpJsonDataSource {
    pub fn new() -> Self {
        HttpJsonDataSource {
            http_client: build_client(),
        }
    }
}

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .build()
        .expect("failed to build the upstream HTTP client")
}

fn parse_method(raw: Option<&[u8]>) -> reqwest::Method {
    match raw {
        Some(b"POST") => reqwest::Method::POST,
        Some(b"PUT") => reqwest::Method::PUT,
        Some(b"DELETE") => reqwest::Method::DELETE,
        Some(b"PATCH") => reqwest::Method::PATCH,
        _ => reqwest::Method::GET,
    }
}

/// Removes one level of backslash escaping: `\x` becomes `x`. Template
/// resolution leaves `\"` sequences in JSON bodies lifted from plan
/// literals; a single pass keeps payloads that legitimately contain
/// backslashes intact.
pub(crate) fn unescape_once(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter();
    while let Some(&byte) = bytes.next() {
        if byte == b'\\' {
            if let Some(&escaped) = bytes.next() {
                out.push(escaped);
            }
        } else {
            out.push(byte);
        }
    }
    out
}

fn header_map(raw: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let parsed: HashMap<String, String> = match sonic_rs::from_slice(raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(error = %error, "headers argument is not a JSON string map, ignoring");
            return headers;
        }
    };
    for (key, value) in parsed {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %key, "skipping invalid header"),
        }
    }
    headers
}

/// Injects `"__typename":"…"` at the top level of an object response, using
/// the status code mapping first and `defaultTypeName` second. Non-object
/// bodies are returned untouched.
fn inject_typename(body: &Bytes, mapping: &[u8], status: u16) -> Bytes {
    let type_name = projection::select_string(mapping, &[status.to_string()])
        .or_else(|| projection::select_string(mapping, &["defaultTypeName".to_string()]));
    let Some(type_name) = type_name else {
        return body.clone();
    };

    let trimmed: &[u8] = {
        let start = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(body.len());
        &body[start..]
    };
    if trimmed.first() != Some(&b'{') {
        return body.clone();
    }

    let rest = &trimmed[1..];
    let has_members = rest.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'}');
    let mut out = Vec::with_capacity(body.len() + type_name.len() + 16);
    out.extend_from_slice(b"{\"__typename\":\"");
    out.extend_from_slice(&type_name);
    out.push(b'"');
    if has_members {
        out.push(b',');
    }
    out.extend_from_slice(rest);
    Bytes::from(out)
}

#[async_trait]
impl DataSource for HttpJsonDataSource {
    #[instrument(level = "debug", skip_all, name = "HttpJsonDataSource::resolve")]
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
        let method = parse_method(args.by_key(b"method"));
        let url = compose_url(host, url_arg);

        debug!(url = %url, method = %method, "dispatching upstream request");

        let mut request = self.http_client.request(method, url.as_str());
        if let Some(body) = args.by_key(b"body") {
            request = request.body(unescape_once(body));
        }
        if let Some(headers) = args.by_key(b"headers") {
            request = request.headers(header_map(headers));
        }

        let exchange = async {
            let response = request.send().await.map_err(|error| {
                if error.is_timeout() {
                    DataSourceError::RequestTimeout(url.clone(), REQUEST_TIMEOUT.as_millis())
                } else {
                    DataSourceError::RequestFailure(url.clone(), error.to_string())
                }
            })?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|error| DataSourceError::RequestFailure(url.clone(), error.to_string()))?;
            Ok::<_, DataSourceError>((status, body))
        };

        let (status, body) = tokio::select! {
            _ = ctx.cancelled() => return Ok(Instruction::CloseConnection),
            result = exchange => result?,
        };

        let body = match args.by_key(b"__typename") {
            Some(mapping) => inject_typename(&body, mapping, status),
            None => body,
        };
        out.extend_from_slice(&body);
        Ok(Instruction::CloseConnectionIfNotStream)
    }
}
