use std::collections::HashMap;

use bytes::Bytes;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use xxhash_rust::xxh3::xxh3_64;

/// Request-scoped state shared by every fetch of a single execution: the
/// request variables (indexed by a 64-bit hash of the variable name) and the
/// cancellation signal that data sources must honor.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: HashMap<u64, Bytes>,
    cancellation: CancellationToken,
}

fn hash_variable_name(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Context {
            variables: HashMap::new(),
            cancellation,
        }
    }

    /// Derives a context that shares the variables but owns a child
    /// cancellation token, so cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Context {
            variables: self.variables.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn insert_variable(&mut self, name: &str, value: impl Into<Bytes>) {
        self.variables.insert(hash_variable_name(name), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&Bytes> {
        self.variables.get(&hash_variable_name(name))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }
}
