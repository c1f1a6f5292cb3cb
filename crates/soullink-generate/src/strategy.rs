//! Capability traits implemented by the generation strategies.

use crate::error::GenerateError;
use crate::extract::ExpressionDraft;
use async_trait::async_trait;
use serde::Serialize;
use soullink_types::{ChatTurn, ParameterSchema};
use std::fmt;

/// Which concrete expression strategy is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Local,
    Remote,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Turns text into an unvalidated expression.
#[async_trait]
pub trait ExpressionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether the resources this strategy needs are present right now.
    fn is_available(&self) -> bool;

    async fn generate(&self, text: &str, context: &str) -> Result<ExpressionDraft, GenerateError>;

    /// Called after a client announces a new parameter schema.
    fn on_schema_update(&self, _schema: &ParameterSchema) {}
}

/// Produces a conversational reply.
#[async_trait]
pub trait ChatStrategy: Send + Sync {
    async fn reply(&self, message: &str, history: &[ChatTurn]) -> Result<String, GenerateError>;
}
