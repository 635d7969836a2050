use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Failure of a single data source invocation. Non-root failures null out
/// the fields bound to the fetch and surface as a response-level error
/// entry; only a failing root fetch aborts the request.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DataSourceError {
    #[error("no data source registered under \"{0}\"")]
    UnknownDataSource(String),
    #[error("argument \"{0}\" is required")]
    MissingArgument(&'static str),
    #[error("invalid argument \"{0}\": {1}")]
    InvalidArgument(&'static str, String),
    #[error("request to \"{0}\" failed: {1}")]
    RequestFailure(String, String),
    #[error("request to \"{0}\" timed out after {1} ms")]
    RequestTimeout(String, u128),
}

impl DataSourceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DataSourceError::UnknownDataSource(_) => "DATA_SOURCE_NOT_FOUND",
            DataSourceError::MissingArgument(_) => "DATA_SOURCE_MISSING_ARGUMENT",
            DataSourceError::InvalidArgument(_, _) => "DATA_SOURCE_INVALID_ARGUMENT",
            DataSourceError::RequestFailure(_, _) => "UPSTREAM_REQUEST_FAILURE",
            DataSourceError::RequestTimeout(_, _) => "UPSTREAM_REQUEST_TIMEOUT",
        }
    }
}

/// Fatal conditions: plan-invariant violations and root fetch failures.
/// Everything else degrades to `null` plus an error entry.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("field \"{0}\" has no buffer produced by the enclosing fetch")]
    MissingBuffer(String),
    #[error("root fetch failed: {0}")]
    RootFetchFailure(#[from] DataSourceError),
    #[error("plan is malformed: {0}")]
    MalformedPlan(String),
}

/// Error entry of the response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl GraphQLError {
    pub fn from_message(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn from_message_and_code(message: impl Into<String>, code: &str) -> Self {
        GraphQLError {
            message: message.into(),
            path: None,
            extensions: Some(HashMap::from_iter([(
                "code".to_string(),
                serde_json::Value::String(code.to_string()),
            )])),
        }
    }
}

impl From<DataSourceError> for GraphQLError {
    fn from(error: DataSourceError) -> Self {
        GraphQLError::from_message_and_code(error.to_string(), error.error_code())
    }
}
