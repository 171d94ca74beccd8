//! Ordered chain of classification stages.
//!
//! Each stage either decides, passes (`Ok(None)`), or fails. The first
//! decision wins. When every stage passes or a stage fails the chain degrades
//! to a general question with zero confidence instead of failing the request.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EngineError;
use crate::types::{AgreementId, Classification, Turn};

pub const EXPLICIT_CONFIDENCE: f32 = 1.0;

pub struct ClassificationRequest<'a> {
    pub text: &'a str,
    pub history: &'a [Turn],
    pub explicit_agreement: Option<&'a AgreementId>,
}

#[async_trait]
pub trait ClassificationStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Option<Classification>, EngineError>;
}

/// A caller-supplied agreement identifier scopes the query without asking
/// the model.
pub struct ExplicitAgreementStage;

#[async_trait]
impl ClassificationStage for ExplicitAgreementStage {
    fn name(&self) -> &'static str {
        "explicit_agreement"
    }

    async fn try_classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Option<Classification>, EngineError> {
        Ok(request
            .explicit_agreement
            .map(|id| Classification::ccn_search(id.clone(), EXPLICIT_CONFIDENCE)))
    }
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub classification: Classification,
    /// Name of the deciding stage, or `"fallback"`.
    pub decided_by: &'static str,
}

impl ChainOutcome {
    pub fn is_fallback(&self) -> bool {
        self.decided_by == FALLBACK_STAGE
    }
}

const FALLBACK_STAGE: &str = "fallback";

#[derive(Default, Clone)]
pub struct ClassifierChain {
    stages: Vec<Arc<dyn ClassificationStage>>,
}

impl ClassifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Arc<dyn ClassificationStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn classify(&self, request: &ClassificationRequest<'_>) -> ChainOutcome {
        for stage in &self.stages {
            match stage.try_classify(request).await {
                Ok(Some(classification)) => {
                    tracing::info!(
                        stage = stage.name(),
                        intent = ?classification.intent,
                        idcc = ?classification.agreement_id.as_ref().map(|id| id.as_str()),
                        confidence = classification.confidence,
                        "Query classified"
                    );
                    return ChainOutcome {
                        classification,
                        decided_by: stage.name(),
                    };
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        stage = stage.name(),
                        kind = e.kind(),
                        error = %e,
                        "Classification stage failed, falling back to general question"
                    );
                    return Self::fallback();
                }
            }
        }
        tracing::info!("No classification stage decided, falling back to general question");
        Self::fallback()
    }

    fn fallback() -> ChainOutcome {
        ChainOutcome {
            classification: Classification::fallback(),
            decided_by: FALLBACK_STAGE,
        }
    }
}
