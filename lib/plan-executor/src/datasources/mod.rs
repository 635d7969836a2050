use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::{arguments::ResolvedArgs, context::Context, error::DataSourceError};

pub mod graphql;
pub mod http_json;
pub mod http_polling_stream;
pub mod schema_type;
pub mod static_data;

pub use graphql::GraphQLDataSource;
pub use http_json::HttpJsonDataSource;
pub use http_polling_stream::HttpPollingStreamDataSource;
pub use schema_type::{SchemaTypes, TypeDataSource, TypeDefinition, TypeFieldDefinition};
pub use static_data::StaticDataSource;

/// Post-invocation signal from a data source to the execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Instruction {
    #[default]
    Continue,
    CloseConnection,
    CloseConnectionIfNotStream,
}

/// A single upstream. `resolve` writes the response bytes for the enclosing
/// fetch's buffer into `out`. Implementations must honor cancellation by
/// aborting in-flight I/O and returning `CloseConnection` promptly.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn resolve(
        &self,
        ctx: &Context,
        args: &ResolvedArgs,
        out: &mut Vec<u8>,
    ) -> Result<Instruction, DataSourceError>;
}

/// Registry dispatching fetches to data sources by plan-assigned name.
/// Instances are shared across requests and must be internally synchronized.
#[derive(Default)]
pub struct DataSourceMap {
    inner: HashMap<String, Arc<dyn DataSource>>,
}

impl DataSourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl DataSource + 'static) {
        self.inner.insert(name.into(), Arc::new(source));
    }

    pub fn insert_arc(&mut self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        self.inner.insert(name.into(), source);
    }

    #[instrument(level = "trace", skip_all, fields(data_source = %name))]
    pub async fn resolve(
        &self,
        name: &str,
        ctx: &Context,
        args: &ResolvedArgs,
        out: &mut Vec<u8>,
    ) -> Result<Instruction, DataSourceError> {
        match self.inner.get(name) {
            Some(source) => source.resolve(ctx, args, out).await,
            None => {
                warn!("no data source registered under \"{}\"", name);
                Err(DataSourceError::UnknownDataSource(name.to_string()))
            }
        }
    }
}

/// Joins `host` and `url`, defaulting the scheme to `https://` when the
/// host carries none.
pub(crate) fn compose_url(host: &[u8], url: &[u8]) -> String {
    let mut composed = String::with_capacity(host.len() + url.len() + 8);
    composed.push_str(&String::from_utf8_lossy(host));
    composed.push_str(&String::from_utf8_lossy(url));
    if composed.starts_with("http://") || composed.starts_with("https://") {
        composed
    } else {
        format!("https://{composed}")
    }
}
