use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::ApiProvider;

pub const ENV_LLM_API_KEY: &str = "CCN_LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "CCN_LLM_MODEL";
pub const ENV_STORE_API_KEY: &str = "CCN_STORE_API_KEY";
pub const ENV_STORE_URL: &str = "CCN_STORE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub llm: LlmSettings,
    pub classification: ClassificationConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    pub limits: QueryLimits,
    pub store: StoreSettings,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: ApiProvider,
    pub model: String,
    /// Sourced from `CCN_LLM_API_KEY`; never written back out.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    /// Total attempts per completion call, capped at 2.
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Trailing conversation turns shown to the LLM classifier.
    pub history_turns: usize,
    pub max_tokens: usize,
    pub timeout_ms: u64,
    /// Treat a bare 4-digit token as an IDCC even without "idcc"/"ccn" next to it.
    pub allow_bare_identifiers: bool,
    /// Minimum name similarity for resolving an agreement from its name.
    pub min_name_similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub timeout_ms: u64,
    /// Passage text injected into the synthesis prompt is cut at this length.
    pub max_passage_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub history_turns: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub max_query_chars: usize,
    pub max_history_turns: usize,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSettings {
    /// Passages loaded from a local JSON corpus (or empty).
    Memory {
        #[serde(default)]
        corpus_path: Option<PathBuf>,
    },
    /// PostgREST-style remote store.
    Rest {
        base_url: String,
        #[serde(default, skip_serializing)]
        api_key: String,
        #[serde(default = "default_store_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_store_timeout_secs() -> u64 {
    10
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ApiProvider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            temperature: 0.2,
            max_attempts: 2,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 2_000,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            history_turns: 4,
            max_tokens: 200,
            timeout_ms: 8_000,
            allow_bare_identifiers: true,
            min_name_similarity: 0.6,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 20,
            max_top_k: 100,
            timeout_ms: 10_000,
            max_passage_chars: 2_000,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            history_turns: 4,
            timeout_ms: 90_000,
        }
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_query_chars: 4_000,
            max_history_turns: 50,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings::Memory { corpus_path: None }
    }
}

// Secrets are redacted from Debug output so configs can be logged.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .finish()
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreSettings::Memory { corpus_path } => f
                .debug_struct("Memory")
                .field("corpus_path", corpus_path)
                .finish(),
            StoreSettings::Rest {
                base_url,
                api_key,
                timeout_secs,
            } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("api_key", &redact(api_key))
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl ClassificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.model.trim().is_empty() {
            return Err("llm.model must not be empty".into());
        }
        if self.llm.request_timeout_secs == 0 || self.llm.connect_timeout_secs == 0 {
            return Err("llm timeouts must be > 0".into());
        }
        if self.llm.max_attempts == 0 {
            return Err("llm.max_attempts must be >= 1".into());
        }
        if let ApiProvider::Custom { endpoint } = &self.llm.provider {
            if !is_http_url(endpoint) {
                return Err("llm.provider.custom.endpoint must start with http:// or https://".into());
            }
        }
        if self.classification.timeout_ms == 0
            || self.retrieval.timeout_ms == 0
            || self.synthesis.timeout_ms == 0
        {
            return Err("stage timeouts must be > 0".into());
        }
        if self.classification.max_tokens == 0 {
            return Err("classification.max_tokens must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.classification.min_name_similarity) {
            return Err("classification.min_name_similarity must be in [0.0, 1.0]".into());
        }
        if self.retrieval.default_top_k == 0 {
            return Err("retrieval.default_top_k must be > 0".into());
        }
        if self.retrieval.default_top_k > self.retrieval.max_top_k {
            return Err("retrieval.default_top_k must be <= retrieval.max_top_k".into());
        }
        if self.retrieval.max_passage_chars < 100 {
            return Err("retrieval.max_passage_chars must be >= 100".into());
        }
        if self.limits.max_query_chars == 0 {
            return Err("limits.max_query_chars must be > 0".into());
        }
        if let StoreSettings::Rest {
            base_url,
            timeout_secs,
            ..
        } = &self.store
        {
            if !is_http_url(base_url) {
                return Err("store.base_url must start with http:// or https://".into());
            }
            if *timeout_secs == 0 {
                return Err("store.timeout_secs must be > 0".into());
            }
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }

    /// Overlay secrets and deployment-specific values from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_LLM_API_KEY).filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
        if let Some(url) = lookup(ENV_STORE_URL).filter(|v| !v.is_empty()) {
            if let StoreSettings::Rest { base_url, .. } = &mut self.store {
                *base_url = url;
            } else {
                self.store = StoreSettings::Rest {
                    base_url: url,
                    api_key: String::new(),
                    timeout_secs: default_store_timeout_secs(),
                };
            }
        }
        if let Some(key) = lookup(ENV_STORE_API_KEY).filter(|v| !v.is_empty()) {
            if let StoreSettings::Rest { api_key, .. } = &mut self.store {
                *api_key = key;
            }
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
