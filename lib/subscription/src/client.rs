use async_trait::async_trait;

use crate::messages::{ClientMessage, ServerMessage};

/// One connected subscriber. The handler reads from and writes to the
/// client concurrently, so implementations must be internally synchronized
/// (a WebSocket implementation typically splits its sink and stream).
///
/// `read_message` returning `Ok(None)` means the peer went away cleanly;
/// an `Err` is a protocol or transport fault surfaced to the peer as a
/// `connection_error` message.
#[async_trait]
pub trait SubscriptionClient: Send + Sync + 'static {
    async fn read_message(&self) -> Result<Option<ClientMessage>, ClientError>;
    async fn write_message(&self, message: ServerMessage) -> Result<(), ClientError>;
    fn is_connected(&self) -> bool;
    async fn disconnect(&self);
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("could not read message from client: {0}")]
    Read(String),
    #[error("could not write message to client: {0}")]
    Write(String),
    #[error("malformed client message: {0}")]
    Malformed(String),
}
