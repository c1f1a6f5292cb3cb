//! Expression and chat generation for the SoulLink hub.
//!
//! Strategies turn text into unvalidated [`ExpressionDraft`]s or chat replies.
//! The [`Orchestrator`] runs them, bounds them with timeouts and validates every
//! expression against the current [`SchemaStore`] before it leaves this crate.

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod local;
pub mod orchestrator;
pub mod remote;
pub mod selector;
pub mod store;
pub mod strategy;

pub use chat::RemoteChat;
pub use config::{ApiConfig, ApiOverrides, LocalModelConfig, StrategyMode};
pub use error::GenerateError;
pub use extract::ExpressionDraft;
pub use local::{InferenceEngine, LoadedModel, LocalExpression, ProcessEngine};
pub use orchestrator::{ChatOutcome, Orchestrator};
pub use remote::RemoteExpression;
pub use selector::select_expression_strategy;
pub use store::SchemaStore;
pub use strategy::{ChatStrategy, ExpressionStrategy, StrategyKind};
