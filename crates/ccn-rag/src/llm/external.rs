//! HTTP completion provider for OpenAI-compatible chat APIs and Anthropic messages.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ApiProvider, CompletionError, CompletionProvider, ProviderInfo, ResponseFormat};
use crate::config::LlmSettings;

const ERROR_PREVIEW_CHARS: usize = 300;

/// External API provider
pub struct HttpCompletionProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    client: Client,
}

impl HttpCompletionProvider {
    pub fn new(settings: &LlmSettings) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            provider = ?settings.provider,
            model = %settings.model,
            connect_timeout_secs = settings.connect_timeout_secs,
            "Creating HttpCompletionProvider"
        );

        Ok(Self {
            provider: settings.provider.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            request_timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match &self.provider {
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            ApiProvider::Mistral => "https://api.mistral.ai/v1/chat/completions".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    fn map_send_error(&self, endpoint: &str, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            tracing::error!(endpoint = %endpoint, "Completion request timed out");
            CompletionError::Timeout(self.request_timeout)
        } else if e.is_connect() {
            tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
            CompletionError::Transport(format!("failed to connect to {}: {}", endpoint, e))
        } else {
            tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
            CompletionError::Transport(format!("request to {} failed: {}", endpoint, e))
        }
    }

    /// Read a response body as JSON, rejecting error statuses and HTML error pages
    /// (gateways sometimes answer 200 with HTML).
    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, CompletionError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(endpoint, e))?;

        if !status.is_success() {
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            return Err(CompletionError::MalformedBody(format!(
                "{} returned HTML instead of JSON: {}",
                endpoint,
                preview(trimmed)
            )));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            CompletionError::MalformedBody(format!(
                "failed to parse JSON from {}: {}. Body: {}",
                endpoint,
                e,
                preview(&body)
            ))
        })
    }

    async fn openai_compatible_complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        format: ResponseFormat,
    ) -> Result<String, CompletionError> {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            max_tokens = max_tokens,
            prompt_len = prompt.len(),
            "Sending OpenAI-compatible request"
        );

        let mut request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "stream": false
        });
        if format == ResponseFormat::Json {
            request["response_format"] = json!({"type": "json_object"});
        }

        let mut builder = self.client.post(&endpoint).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        let result: OpenAIResponse = self.read_json(response, &endpoint).await?;
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::MalformedBody("no choices returned from API".into()))?;

        tracing::debug!(chars = content.len(), "API response received");
        Ok(content)
    }

    async fn anthropic_complete(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<String, CompletionError> {
        let endpoint = self.endpoint();
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": max_tokens,
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        let result: AnthropicResponse = self.read_json(response, &endpoint).await?;
        let text: String = result
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(CompletionError::MalformedBody(
                "no text content returned from Anthropic API".into(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        format: ResponseFormat,
    ) -> Result<String, CompletionError> {
        match &self.provider {
            ApiProvider::Anthropic => self.anthropic_complete(prompt, max_tokens).await,
            ApiProvider::OpenAI
            | ApiProvider::Mistral
            | ApiProvider::Ollama
            | ApiProvider::Custom { .. } => {
                self.openai_compatible_complete(prompt, max_tokens, format)
                    .await
            }
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.provider.name().to_string(),
            model: self.model.clone(),
            supports_json_mode: !matches!(self.provider, ApiProvider::Anthropic),
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_PREVIEW_CHARS).collect()
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}
