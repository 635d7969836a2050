//! Subscription lifecycle management over any message transport.
//!
//! The handler owns one client connection: it acknowledges the handshake,
//! emits keep-alive messages, spawns one task per started subscription and
//! forwards every execution frame as a `data` message until the operation
//! completes, the client stops it, or the connection goes away.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use fuse_router_plan_executor::{error::ExecutionError, Context, GraphQLRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod client;
pub mod messages;

pub use client::{ClientError, SubscriptionClient};
pub use messages::{ClientMessage, OperationPayload, ServerMessage};

const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
const FRAME_CHANNEL_CAPACITY: usize = 8;

/// Executes one operation, sending each emitted document to `sink`. The
/// engine returns once the stream ends or `ctx` is cancelled. Implemented
/// by the gateway on top of the plan executor; tests plug in fakes.
#[async_trait]
pub trait OperationEngine: Send + Sync + 'static {
    async fn execute(
        &self,
        payload: &OperationPayload,
        ctx: &Context,
        sink: mpsc::Sender<Bytes>,
    ) -> Result<(), EngineError>;
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("operation rejected: {0}")]
    Rejected(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<ExecutionError> for EngineError {
    fn from(error: ExecutionError) -> Self {
        EngineError::Execution(error.to_string())
    }
}

pub struct SubscriptionHandler<C, E> {
    client: Arc<C>,
    engine: Arc<E>,
    keep_alive_interval: Duration,
    subscriptions: Arc<DashMap<String, CancellationToken>>,
}

impl<C, E> SubscriptionHandler<C, E>
where
    C: SubscriptionClient,
    E: OperationEngine,
{
    pub fn new(client: C, engine: E) -> Self {
        SubscriptionHandler {
            client: Arc::new(client),
            engine: Arc::new(engine),
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    pub fn set_keep_alive_interval(&mut self, interval: Duration) {
        self.keep_alive_interval = interval;
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drives the connection until the context is cancelled, the client
    /// disconnects, or the client terminates the connection.
    pub async fn handle(&self, ctx: CancellationToken) {
        let mut keep_alive_started = false;
        loop {
            if !self.client.is_connected() {
                self.shutdown();
                return;
            }
            let message = tokio::select! {
                biased;
                message = self.client.read_message() => message,
                _ = ctx.cancelled() => {
                    self.shutdown();
                    return;
                }
            };
            match message {
                Err(error) => {
                    warn!(error = %error, "failed to read from the subscription client");
                    let _ = self
                        .client
                        .write_message(ServerMessage::ConnectionError {
                            payload: serde_json::Value::String(
                                "could not read message from client".to_string(),
                            ),
                        })
                        .await;
                }
                Ok(None) => {
                    self.shutdown();
                    return;
                }
                Ok(Some(ClientMessage::ConnectionInit { .. })) => {
                    debug!("connection handshake");
                    let _ = self.client.write_message(ServerMessage::ConnectionAck).await;
                    if !keep_alive_started {
                        keep_alive_started = true;
                        self.spawn_keep_alive(&ctx);
                    }
                }
                Ok(Some(ClientMessage::Start { id, payload })) => {
                    self.start_subscription(&ctx, id, payload);
                }
                Ok(Some(ClientMessage::Stop { id })) => {
                    self.stop_subscription(&id);
                }
                Ok(Some(ClientMessage::ConnectionTerminate)) => {
                    self.shutdown();
                    self.client.disconnect().await;
                    return;
                }
            }
            if ctx.is_cancelled() {
                self.shutdown();
                return;
            }
        }
    }

    fn spawn_keep_alive(&self, ctx: &CancellationToken) {
        let client = self.client.clone();
        let interval = self.keep_alive_interval;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the ack already went out.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = ticker.tick() => {
                        if !client.is_connected() {
                            return;
                        }
                        if client.write_message(ServerMessage::KeepAlive).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    fn start_subscription(&self, ctx: &CancellationToken, id: String, payload: OperationPayload) {
        if self.subscriptions.contains_key(&id) {
            warn!(id = %id, "subscription id already active, ignoring start");
            return;
        }
        let token = ctx.child_token();
        self.subscriptions.insert(id.clone(), token.clone());
        debug!(id = %id, "starting subscription");

        let client = self.client.clone();
        let engine = self.engine.clone();
        let subscriptions = self.subscriptions.clone();
        tokio::spawn(async move {
            let exec_ctx = GraphQLRequest {
                query: payload.query.clone(),
                operation_name: payload.operation_name.clone(),
                variables: payload.variables.clone(),
            }
            .into_context(token);

            let (tx, mut rx) = mpsc::channel::<Bytes>(FRAME_CHANNEL_CAPACITY);
            let forward = async {
                while let Some(frame) = rx.recv().await {
                    let payload = serde_json::from_slice::<serde_json::Value>(&frame)
                        .unwrap_or(serde_json::Value::Null);
                    let message = ServerMessage::Data {
                        id: id.clone(),
                        payload,
                    };
                    if client.write_message(message).await.is_err() {
                        break;
                    }
                }
            };
            let (result, _) = tokio::join!(engine.execute(&payload, &exec_ctx, tx), forward);

            if let Err(error) = result {
                warn!(id = %id, error = %error, "subscription ended with an error");
                let _ = client
                    .write_message(ServerMessage::Data {
                        id: id.clone(),
                        payload: serde_json::json!({
                            "errors": [{"message": error.to_string()}]
                        }),
                    })
                    .await;
            }
            let _ = client
                .write_message(ServerMessage::Complete { id: id.clone() })
                .await;
            subscriptions.remove(&id);
            debug!(id = %id, "subscription finished");
        });
    }

    fn stop_subscription(&self, id: &str) {
        if let Some((_, token)) = self.subscriptions.remove(id) {
            debug!(id = %id, "stopping subscription");
            token.cancel();
        }
    }

    fn shutdown(&self) {
        for entry in self.subscriptions.iter() {
            entry.value().cancel();
        }
        self.subscriptions.clear();
    }
}
