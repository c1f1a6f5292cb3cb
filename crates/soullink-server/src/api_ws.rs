//! WebSocket API handler and connection management.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use soullink_catalog::CatalogEntry;
use soullink_generate::ChatOutcome;
use soullink_types::{ChatTurn, GeneratedExpression, ParameterSchema, DEFAULT_TRANSITION_MS};
use std::{collections::BTreeMap, collections::HashMap, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Per-connection outbound buffer. A client that falls this far behind is
/// treated as failed and removed.
const CLIENT_CHANNEL_CAPACITY: usize = 256;

fn default_true() -> bool {
    true
}

fn default_duration() -> u64 {
    DEFAULT_TRANSITION_MS
}

fn default_relay_duration() -> Value {
    Value::from(DEFAULT_TRANSITION_MS)
}

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// Client announces the parameter schema of its loaded model.
    UpdateParameters {
        #[serde(default)]
        parameters: ParameterSchema,
    },
    /// Expression-only generation, broadcast to every client.
    Chat {
        message: String,
        #[serde(default)]
        context: String,
        #[serde(rename = "autoReset", default = "default_true")]
        auto_reset: bool,
    },
    /// Chat reply plus expression, answered to the sender only.
    ChatWithReply {
        message: String,
        #[serde(default)]
        context: String,
        #[serde(default)]
        history: Vec<ChatTurn>,
        #[serde(rename = "autoReset", default = "default_true")]
        auto_reset: bool,
    },
    /// Parameters set directly by a client, relayed without validation.
    Expression {
        #[serde(default)]
        parameters: Map<String, Value>,
        #[serde(default = "default_relay_duration")]
        duration: Value,
        #[serde(rename = "autoReset", default)]
        auto_reset: bool,
    },
    Reset {
        #[serde(default = "default_duration")]
        duration: u64,
    },
    Ping,
    LoadModel {
        model: String,
    },
}

/// Outgoing WebSocket message wrapper.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    ModelList {
        models: Vec<CatalogEntry>,
        current: Option<String>,
    },
    LoadModel {
        model: CatalogEntry,
    },
    Expression {
        #[serde(skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
        parameters: Map<String, Value>,
        /// Generated expressions carry whole milliseconds; client relays keep
        /// whatever value they were sent.
        duration: Value,
        #[serde(rename = "autoReset")]
        auto_reset: bool,
    },
    Reset {
        duration: u64,
    },
    ChatResponse(ChatResponsePayload),
    ChatError {
        error: String,
    },
    ParametersUpdated {
        count: usize,
    },
    Error {
        message: String,
    },
    Pong,
}

/// Body of a `chat_response` message. Both branches are always present; a
/// failed branch carries its default and the failure text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponsePayload {
    pub reply: String,
    pub expression: String,
    pub parameters: BTreeMap<String, f64>,
    pub duration: u64,
    pub auto_reset: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression_error: Option<String>,
}

impl ChatResponsePayload {
    pub fn from_outcome(outcome: ChatOutcome, auto_reset: bool) -> Self {
        Self {
            reply: outcome.reply,
            expression: outcome.expression.label,
            parameters: outcome.expression.parameters,
            duration: outcome.expression.transition_duration_ms,
            auto_reset,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            reply_error: outcome.reply_error,
            expression_error: outcome.expression_error,
        }
    }
}

impl OutgoingMessage {
    /// `expression` broadcast for a validated, generated expression.
    pub fn generated(expression: GeneratedExpression, auto_reset: bool) -> Self {
        let parameters = expression
            .parameters
            .into_iter()
            .map(|(id, value)| (id, Value::from(value)))
            .collect();
        Self::Expression {
            expression: Some(expression.label),
            parameters,
            duration: Value::from(expression.transition_duration_ms),
            auto_reset,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Failure to deliver a message to one client.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to deliver to client {client_id}: {reason}")]
    Transport { client_id: Uuid, reason: String },
}

/// Type alias for session map to satisfy clippy complexity checks.
type SessionMap = HashMap<Uuid, mpsc::Sender<String>>;

/// Live set of connected presentation clients.
///
/// Delivery is non-blocking: each client has a bounded outbound queue drained
/// by its own writer task. A client whose queue is full or closed is removed on
/// that first failure and never retried.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    sessions: Arc<RwLock<SessionMap>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client's outbound queue and returns its id.
    pub async fn register(&self, sender: mpsc::Sender<String>) -> Uuid {
        let mut sessions = self.sessions.write().await;
        let mut client_id = Uuid::new_v4();
        while sessions.contains_key(&client_id) {
            client_id = Uuid::new_v4();
        }
        sessions.insert(client_id, sender);
        tracing::info!(client_id = %client_id, clients = sessions.len(), "client registered");
        client_id
    }

    /// Removes a client. Returns whether it was still registered.
    pub async fn unregister(&self, client_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&client_id).is_some();
        if removed {
            tracing::info!(client_id = %client_id, clients = sessions.len(), "client unregistered");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, client_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&client_id)
    }

    /// Sends one message to one client. On failure the client is removed and
    /// the failure returned.
    pub async fn send_to(&self, client_id: Uuid, message: &OutgoingMessage) -> Result<(), HubError> {
        let json = encode(message).map_err(|reason| HubError::Transport { client_id, reason })?;

        let result = {
            let sessions = self.sessions.read().await;
            match sessions.get(&client_id) {
                Some(sender) => sender.try_send(json).map_err(|e| e.to_string()),
                None => Err("client is not connected".to_string()),
            }
        };

        if let Err(reason) = result {
            tracing::warn!(client_id = %client_id, "dropping client after failed send: {}", reason);
            self.unregister(client_id).await;
            return Err(HubError::Transport { client_id, reason });
        }
        Ok(())
    }

    /// Sends one message to every client and returns how many accepted it.
    ///
    /// The write lock is held for the whole fan-out so concurrent broadcasts
    /// reach every client in the same order. Failing clients are removed in
    /// the same critical section without affecting delivery to the rest.
    pub async fn broadcast(&self, message: &OutgoingMessage) -> usize {
        let json = match encode(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize broadcast message: {}", e);
                return 0;
            }
        };

        let mut sessions = self.sessions.write().await;
        let mut failed = Vec::new();
        for (client_id, sender) in sessions.iter() {
            if let Err(e) = sender.try_send(json.clone()) {
                tracing::warn!(client_id = %client_id, "dropping client after failed broadcast: {}", e);
                failed.push(*client_id);
            }
        }
        for client_id in &failed {
            sessions.remove(client_id);
        }
        sessions.len()
    }
}

fn encode(message: &OutgoingMessage) -> Result<String, String> {
    serde_json::to_string(message).map_err(|e| format!("failed to serialize message: {}", e))
}

/// Best-effort reply; a failed send has already unregistered the client.
async fn reply(state: &AppState, client_id: Uuid, message: OutgoingMessage) {
    if let Err(e) = state.hub.send_to(client_id, &message).await {
        tracing::debug!("reply dropped: {}", e);
    }
}

/// Current catalog snapshot with the informational current model.
pub fn model_list(state: &AppState) -> OutgoingMessage {
    OutgoingMessage::ModelList {
        models: state.catalog.entries(),
        current: state.current_model(),
    }
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "websocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Handles the WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_CHANNEL_CAPACITY);
    let client_id = state.hub.register(tx).await;
    tracing::info!(client_id = %client_id, remote_addr = %addr, "websocket client connected");

    // Forward queued messages to the socket. Ends when the hub drops the
    // client's sender or the socket stops accepting writes.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    reply(&state, client_id, model_list(&state)).await;

    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            _ = &mut send_task => break,
        };

        match msg {
            Some(Ok(AxumMessage::Text(text))) => {
                // Not raced against disconnect: generation finishes and the
                // result is dropped by the failed send.
                dispatch(&state, client_id, text.as_str()).await;
            }
            Some(Ok(AxumMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(client_id = %client_id, "websocket read error: {}", e);
                break;
            }
        }
    }

    state.hub.unregister(client_id).await;
    send_task.abort();
    tracing::info!(client_id = %client_id, remote_addr = %addr, "websocket client disconnected");
}

/// Parses one inbound frame and runs it. Malformed frames are answered with
/// `error` (or `chat_error` for `chat_with_reply`) to the sender only.
pub async fn dispatch(state: &AppState, client_id: Uuid, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            reply(state, client_id, OutgoingMessage::error("invalid JSON")).await;
            return;
        }
    };

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let incoming = match serde_json::from_value::<IncomingMessage>(value) {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::debug!(client_id = %client_id, kind = %kind, "rejected inbound message: {}", e);
            let message = match kind.as_str() {
                "" => OutgoingMessage::error("message type is missing"),
                "update_parameters" | "chat" | "expression" | "reset" | "ping" | "load_model" => {
                    OutgoingMessage::error(format!("invalid {} message: {}", kind, e))
                }
                "chat_with_reply" => OutgoingMessage::ChatError {
                    error: format!("invalid chat_with_reply message: {}", e),
                },
                other => OutgoingMessage::error(format!("unsupported message type: {}", other)),
            };
            reply(state, client_id, message).await;
            return;
        }
    };

    match incoming {
        IncomingMessage::UpdateParameters { parameters } => {
            let count = state.orchestrator.update_schema(parameters);
            tracing::info!(client_id = %client_id, count, "parameter schema replaced");
            reply(state, client_id, OutgoingMessage::ParametersUpdated { count }).await;
        }
        IncomingMessage::Chat {
            message,
            context,
            auto_reset,
        } => match state.orchestrator.express(&message, &context).await {
            Ok(expression) => {
                state
                    .hub
                    .broadcast(&OutgoingMessage::generated(expression, auto_reset))
                    .await;
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, "expression generation failed: {}", e);
                reply(state, client_id, OutgoingMessage::error(e.to_string())).await;
            }
        },
        IncomingMessage::ChatWithReply {
            message,
            context,
            history,
            auto_reset,
        } => {
            let outcome = state
                .orchestrator
                .chat_with_expression(&message, &context, &history)
                .await;
            let payload = ChatResponsePayload::from_outcome(outcome, auto_reset);
            reply(state, client_id, OutgoingMessage::ChatResponse(payload)).await;
        }
        IncomingMessage::Expression {
            parameters,
            duration,
            auto_reset,
        } => {
            state
                .hub
                .broadcast(&OutgoingMessage::Expression {
                    expression: None,
                    parameters,
                    duration,
                    auto_reset,
                })
                .await;
        }
        IncomingMessage::Reset { duration } => {
            state.hub.broadcast(&OutgoingMessage::Reset { duration }).await;
        }
        IncomingMessage::Ping => {
            reply(state, client_id, OutgoingMessage::Pong).await;
        }
        IncomingMessage::LoadModel { model } => match state.catalog.get(&model) {
            Some(entry) => {
                state.set_current_model(&entry.name);
                tracing::info!(client_id = %client_id, model = %entry.name, "model loaded");
                state
                    .hub
                    .broadcast(&OutgoingMessage::LoadModel { model: entry })
                    .await;
            }
            None => {
                reply(
                    state,
                    client_id,
                    OutgoingMessage::error(format!("model not found: {}", model)),
                )
                .await;
            }
        },
    }
}
