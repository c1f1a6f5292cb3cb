//! Conversational replies through a remote completions service.

use crate::backend::CompletionClient;
use crate::config::ApiConfig;
use crate::error::GenerateError;
use crate::strategy::ChatStrategy;
use async_trait::async_trait;
use soullink_types::{ChatRole, ChatTurn};
use std::time::Instant;

/// Number of most recent history turns submitted with each request.
pub const HISTORY_WINDOW: usize = 6;

/// Persona used when the configuration does not supply one.
pub const DEFAULT_PERSONA: &str = "You are a cute, lively virtual assistant. Reply to the user \
in a short, friendly way.
Guidelines:
1. Sound natural and have a personality.
2. Use interjections and emoticons where they fit.
3. Keep replies brief, no more than about 50 characters.
4. Match your tone to the mood of the conversation.";

pub struct RemoteChat {
    client: CompletionClient,
    persona: String,
}

impl RemoteChat {
    pub fn new(config: ApiConfig) -> Result<Self, GenerateError> {
        Self::with_persona(config, DEFAULT_PERSONA)
    }

    pub fn with_persona(config: ApiConfig, persona: impl Into<String>) -> Result<Self, GenerateError> {
        Ok(Self {
            client: CompletionClient::new(config)?,
            persona: persona.into(),
        })
    }
}

/// Builds the message list: persona, the last [`HISTORY_WINDOW`] turns, then the
/// current message unless the history already ends with it.
pub fn build_messages(persona: &str, message: &str, history: &[ChatTurn]) -> Vec<ChatTurn> {
    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(ChatTurn::new(ChatRole::System, persona));
    messages.extend(window.iter().cloned());

    let already_last = history.last().is_some_and(|turn| turn.content == message);
    if !already_last {
        messages.push(ChatTurn::user(message));
    }
    messages
}

#[async_trait]
impl ChatStrategy for RemoteChat {
    async fn reply(&self, message: &str, history: &[ChatTurn]) -> Result<String, GenerateError> {
        let messages = build_messages(&self.persona, message, history);

        tracing::debug!(
            model = %self.client.config().model,
            turns = messages.len(),
            "requesting chat reply"
        );
        let started = Instant::now();
        let reply = self.client.complete(&messages).await?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat reply generated"
        );
        Ok(reply)
    }
}
