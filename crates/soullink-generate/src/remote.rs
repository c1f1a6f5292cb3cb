//! Expression generation through a remote completions service.

use crate::backend::CompletionClient;
use crate::config::ApiConfig;
use crate::error::GenerateError;
use crate::extract::{parse_expression_reply, ExpressionDraft};
use crate::store::SchemaStore;
use crate::strategy::{ExpressionStrategy, StrategyKind};
use async_trait::async_trait;
use soullink_types::{ChatRole, ChatTurn, ParameterSchema};
use std::fmt::Write;
use std::time::Instant;

pub struct RemoteExpression {
    client: CompletionClient,
    schema: SchemaStore,
}

impl RemoteExpression {
    pub fn new(config: ApiConfig, schema: SchemaStore) -> Result<Self, GenerateError> {
        Ok(Self {
            client: CompletionClient::new(config)?,
            schema,
        })
    }
}

/// System instruction listing every announced parameter with its range.
pub fn system_prompt(schema: &ParameterSchema) -> String {
    let mut params = String::new();
    for (id, range) in schema.iter() {
        let (low, high) = range.bounds();
        let _ = writeln!(
            params,
            "  - {}: {}, range [{}, {}]",
            id,
            range.display_label(id),
            low,
            high
        );
    }

    format!(
        "You control the facial expression of a Live2D avatar. Given a scene, a line of \
dialogue or a description of a feeling, produce expression parameters.

Parameters available on the current model:
{params}
Reply with JSON in this shape:
{{
  \"expression\": \"short description\",
  \"parameters\": {{
    \"ParameterId\": value,
    ...
  }},
  \"duration\": transition time in milliseconds
}}

Rules:
1. Use values large enough that the change is clearly visible.
2. Combine several parameters to express richer emotions.
3. Eyes, brows and mouth working together matter most.
4. Return only the JSON, no other text."
    )
}

/// User message, prefixed with the scene when one is given.
pub fn user_prompt(text: &str, context: &str) -> String {
    if context.trim().is_empty() {
        text.to_string()
    } else {
        format!("Scene: {}\n\nInput: {}", context, text)
    }
}

#[async_trait]
impl ExpressionStrategy for RemoteExpression {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Remote
    }

    fn is_available(&self) -> bool {
        self.client.config().has_credentials()
    }

    async fn generate(&self, text: &str, context: &str) -> Result<ExpressionDraft, GenerateError> {
        let schema = self.schema.snapshot();
        if schema.is_empty() {
            return Err(GenerateError::EmptySchema);
        }

        let messages = [
            ChatTurn::new(ChatRole::System, system_prompt(&schema)),
            ChatTurn::user(user_prompt(text, context)),
        ];

        tracing::debug!(model = %self.client.config().model, "requesting remote expression");
        let started = Instant::now();
        let content = self.client.complete(&messages).await?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "remote expression generated"
        );

        parse_expression_reply(&content)
    }

    fn on_schema_update(&self, schema: &ParameterSchema) {
        tracing::info!(count = schema.len(), "remote expression strategy schema updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soullink_types::ParameterRange;

    #[test]
    fn system_prompt_lists_each_parameter_with_range() {
        let mut schema = ParameterSchema::new();
        schema.insert("ParamEyeLOpen", ParameterRange::new(0.0, 1.0, "Eye L Open"));
        schema.insert("ParamAngleX", ParameterRange::new(-30.0, 30.0, ""));

        let prompt = system_prompt(&schema);
        assert!(prompt.contains("  - ParamEyeLOpen: Eye L Open, range [0, 1]"));
        assert!(prompt.contains("  - ParamAngleX: ParamAngleX, range [-30, 30]"));
        assert!(prompt.contains("\"duration\""));
    }

    #[test]
    fn user_prompt_includes_scene_only_when_present() {
        assert_eq!(user_prompt("hello", ""), "hello");
        assert_eq!(
            user_prompt("hello", "at the beach"),
            "Scene: at the beach\n\nInput: hello"
        );
    }
}
