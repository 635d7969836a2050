use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::Context;

/// The request envelope accepted over HTTP and WebSocket transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, serde_json::Value>>,
}

impl GraphQLRequest {
    /// Builds the execution context for this request. String variables are
    /// stored as their bare text (templates and URL paths splice them in
    /// unquoted); every other value keeps its raw JSON form.
    pub fn into_context(self, cancellation: CancellationToken) -> Context {
        let mut ctx = Context::with_cancellation(cancellation);
        if let Some(variables) = self.variables {
            for (name, value) in variables {
                match value {
                    serde_json::Value::String(text) => {
                        ctx.insert_variable(&name, text.into_bytes())
                    }
                    value => {
                        ctx.insert_variable(&name, serde_json::to_vec(&value).unwrap_or_default())
                    }
                }
            }
        }
        ctx
    }
}
