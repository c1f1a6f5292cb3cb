//! Shared types for the SoulLink live orchestration hub.
//!
//! This crate holds the data model that crosses crate boundaries: the
//! animation parameter schema announced by presentation clients, the
//! validated expression produced by generation, and chat history turns.
//! Everything here is plain data with `serde` support; behavior lives in
//! `soullink-generate` and `soullink-server`.

pub mod schema;

pub use schema::{ParameterRange, ParameterSchema};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transition duration used when neither the client nor the backend supplies one.
pub const DEFAULT_TRANSITION_MS: u64 = 800;

/// An expression whose parameters have been validated against the schema.
///
/// Every key in `parameters` was present in the schema at validation time and
/// every value lies within that key's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedExpression {
    /// Short description of the expression (e.g. "happy").
    pub label: String,
    /// Parameter id → target value.
    pub parameters: BTreeMap<String, f64>,
    /// Transition time to reach the target values.
    pub transition_duration_ms: u64,
}

impl GeneratedExpression {
    /// An expression that moves nothing.
    pub fn empty(transition_duration_ms: u64) -> Self {
        Self {
            label: String::new(),
            parameters: BTreeMap::new(),
            transition_duration_ms,
        }
    }
}

/// Speaker of a chat turn.
///
/// Roles outside the known three are kept verbatim so client history passes
/// through to the backend unchanged. A missing or null role reads as `user`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ChatRole {
    System,
    #[default]
    User,
    Assistant,
    Other(String),
}

impl ChatRole {
    pub fn as_str(&self) -> &str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Other(role) => role,
        }
    }
}

impl From<Option<String>> for ChatRole {
    fn from(role: Option<String>) -> Self {
        match role.as_deref().map(str::trim) {
            None | Some("") | Some("user") => ChatRole::User,
            Some("system") => ChatRole::System,
            Some("assistant") => ChatRole::Assistant,
            Some(other) => ChatRole::Other(other.to_string()),
        }
    }
}

impl From<ChatRole> for String {
    fn from(role: ChatRole) -> Self {
        role.as_str().to_string()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One turn of conversation history as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: ChatRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}
