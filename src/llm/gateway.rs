use crate::error::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sampling options for a single completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Optional system message sent ahead of the prompt.
    pub system: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::new("gpt-4o", 0.0, 4000)
    }
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
            system: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Stateless text completion. Implementations own transport, auth and retries
/// at the HTTP level; callers own prompt construction and response parsing.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

#[async_trait]
impl<T: LlmGateway + ?Sized> LlmGateway for Arc<T> {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        (**self).complete(prompt, options).await
    }
}

#[async_trait]
impl<T: LlmGateway + ?Sized> LlmGateway for Box<T> {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        (**self).complete(prompt, options).await
    }
}
