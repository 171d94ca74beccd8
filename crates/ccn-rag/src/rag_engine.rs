use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{EngineConfig, LlmSettings, StoreSettings};
use crate::error::EngineError;
use crate::llm::{
    CompletionProvider, HttpCompletionProvider, ProviderInfo, RetryPolicy, RetryingProvider,
};
use crate::rag::{
    AgreementResolver, AnswerSynthesizer, ClassificationRequest, ClassifierChain,
    ExplicitAgreementStage, LlmClassifier, PreDetector, ResponsePolicy,
};
use crate::search::{HierarchicalRetriever, InMemoryPassageStore, PassageStore, RestPassageStore};
use crate::types::{Classification, Intent, Query, RankedContext};

/// Result of one answered query.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResponse {
    pub answer: String,
    pub used_context: RankedContext,
    pub classification: Classification,
}

/// The query pipeline: classify, resolve the agreement, retrieve and rank its
/// passages, synthesize. Holds no per-request state, so one engine serves
/// concurrent requests.
pub struct CcnEngine {
    config: EngineConfig,
    classifier: ClassifierChain,
    resolver: AgreementResolver,
    retriever: HierarchicalRetriever,
    synthesizer: AnswerSynthesizer,
    llm_info: ProviderInfo,
}

impl CcnEngine {
    pub fn new(
        config: EngineConfig,
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn PassageStore>,
    ) -> Self {
        let classifier = ClassifierChain::new()
            .with_stage(Arc::new(PreDetector::new(
                config.classification.allow_bare_identifiers,
            )))
            .with_stage(Arc::new(ExplicitAgreementStage))
            .with_stage(Arc::new(LlmClassifier::new(
                llm.clone(),
                &config.classification,
            )));

        tracing::info!(
            provider = %llm.info().name,
            model = %llm.info().model,
            stages = ?classifier.stage_names(),
            "CCN engine initialized"
        );

        Self {
            resolver: AgreementResolver::new(store.clone(), &config),
            retriever: HierarchicalRetriever::new(store, &config.retrieval),
            synthesizer: AnswerSynthesizer::new(llm.clone(), &config),
            llm_info: llm.info(),
            classifier,
            config,
        }
    }

    /// Build the engine with the HTTP completion provider and the configured store.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        let llm = build_completion_provider(&config.llm)?;
        let store = build_passage_store(&config.store)?;
        Ok(Self::new(config, llm, store))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_info(&self) -> &ProviderInfo {
        &self.llm_info
    }

    pub fn validate_query(&self, query: &Query) -> Result<(), EngineError> {
        let limits = &self.config.limits;
        if query.text.trim().is_empty() {
            return Err(EngineError::InvalidQuery("query text is empty".into()));
        }
        let chars = query.text.chars().count();
        if chars > limits.max_query_chars {
            return Err(EngineError::InvalidQuery(format!(
                "query text is {} characters, limit is {}",
                chars, limits.max_query_chars
            )));
        }
        if query.top_k == Some(0) {
            return Err(EngineError::InvalidQuery("top_k must be at least 1".into()));
        }
        if query.history.len() > limits.max_history_turns {
            return Err(EngineError::InvalidQuery(format!(
                "history has {} turns, limit is {}",
                query.history.len(),
                limits.max_history_turns
            )));
        }
        Ok(())
    }

    /// Answer one query. Each call runs under its own `request_id` span.
    pub async fn answer(&self, query: Query) -> Result<EngineResponse, EngineError> {
        let span = tracing::info_span!("ccn_query", request_id = %Uuid::new_v4());
        self.answer_inner(query).instrument(span).await
    }

    async fn answer_inner(&self, query: Query) -> Result<EngineResponse, EngineError> {
        if let Err(e) = self.validate_query(&query) {
            tracing::warn!(kind = e.kind(), error = %e, "Rejected query");
            return Err(e);
        }
        let start = Instant::now();
        let policy = ResponsePolicy::select(query.response_length);

        let outcome = self
            .classifier
            .classify(&ClassificationRequest {
                text: &query.text,
                history: &query.history,
                explicit_agreement: query.idcc.as_ref(),
            })
            .await;
        let mut classification = outcome.classification;

        let resolved = self.resolver.resolve(&classification).await?;
        if classification.intent != Intent::GeneralQuestion {
            classification.agreement_id = resolved;
        }

        let used_context = match (classification.intent, &classification.agreement_id) {
            (Intent::GeneralQuestion, _) | (_, None) => RankedContext::empty(),
            (_, Some(agreement)) => {
                self.retriever
                    .retrieve(agreement, &query.text, query.top_k)
                    .await?
            }
        };

        let answer = self
            .synthesizer
            .synthesize(&query.text, &query.history, &classification, &used_context, &policy)
            .await?;

        tracing::info!(
            decided_by = outcome.decided_by,
            intent = ?classification.intent,
            idcc = ?classification.agreement_id.as_ref().map(|id| id.as_str()),
            passages = used_context.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Query answered"
        );

        Ok(EngineResponse {
            answer,
            used_context,
            classification,
        })
    }
}

/// HTTP completion provider wrapped with the configured retry policy.
pub fn build_completion_provider(settings: &LlmSettings) -> Result<Arc<dyn CompletionProvider>> {
    let http: Arc<dyn CompletionProvider> = Arc::new(HttpCompletionProvider::new(settings)?);
    Ok(Arc::new(RetryingProvider::new(
        http,
        RetryPolicy::from_settings(settings),
    )))
}

pub fn build_passage_store(settings: &StoreSettings) -> Result<Arc<dyn PassageStore>> {
    Ok(match settings {
        StoreSettings::Memory { corpus_path: Some(path) } => {
            Arc::new(InMemoryPassageStore::from_file(path)?)
        }
        StoreSettings::Memory { corpus_path: None } => {
            tracing::warn!("No corpus configured, passage store is empty");
            Arc::new(InMemoryPassageStore::empty())
        }
        StoreSettings::Rest {
            base_url,
            api_key,
            timeout_secs,
        } => Arc::new(RestPassageStore::new(
            base_url,
            api_key,
            std::time::Duration::from_secs(*timeout_secs),
        )?),
    })
}
