//! LLM Module - completion capability consumed by the classifier and the synthesizer
//!
//! The engine only ever needs `complete(prompt, max_tokens, format) -> text`.
//! Transport details live in [`external`]; retries live in [`retry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod external;
pub mod retry;

pub use external::HttpCompletionProvider;
pub use retry::{RetryPolicy, RetryingProvider};

/// External API providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    OpenAI,
    Anthropic,
    Mistral,
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint.
    Custom { endpoint: String },
}

impl ApiProvider {
    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::OpenAI => "OpenAI",
            ApiProvider::Anthropic => "Anthropic",
            ApiProvider::Mistral => "Mistral",
            ApiProvider::Ollama => "Ollama",
            ApiProvider::Custom { .. } => "Custom",
        }
    }
}

/// Shape the caller expects back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to reach completion endpoint: {0}")]
    Transport(String),

    #[error("completion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedBody(String),

    #[error("completion capability is disabled")]
    Disabled,
}

impl CompletionError {
    /// Failures worth a second attempt: timeouts, connection errors, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedBody(_) | Self::Disabled => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub supports_json_mode: bool,
}

/// Core trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, producing at most `max_tokens` tokens.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        format: ResponseFormat,
    ) -> Result<String, CompletionError>;

    fn info(&self) -> ProviderInfo;
}

/// Quick token estimate (chars / 4).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CompletionError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(CompletionError::Transport("refused".into()).is_transient());
        assert!(CompletionError::Status { status: 503, body: String::new() }.is_transient());
        assert!(CompletionError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!CompletionError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!CompletionError::MalformedBody("x".into()).is_transient());
    }

    #[test]
    fn test_provider_serde() {
        let p: ApiProvider = serde_json::from_str("\"mistral\"").unwrap();
        assert_eq!(p, ApiProvider::Mistral);
        let p: ApiProvider =
            serde_json::from_str(r#"{"custom":{"endpoint":"http://localhost:9000/v1/chat/completions"}}"#)
                .unwrap();
        assert_eq!(p.name(), "Custom");
    }
}
