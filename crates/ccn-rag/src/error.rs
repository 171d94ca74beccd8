//! Error taxonomy shared by every pipeline stage.
//!
//! Collaborator failures (`CompletionError`, `StoreError`) are wrapped so the
//! kind of failure survives up to the HTTP boundary together with its cause.

use thiserror::Error;

use crate::llm::CompletionError;
use crate::search::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected at the boundary: empty or oversized text, bad identifier, bad top_k.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The classification completion call failed (timeout, non-2xx, unreadable body).
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(#[source] CompletionError),

    /// The classifier answered, but not with the expected JSON object.
    #[error("classification response did not match the expected contract: {0}")]
    ClassificationParse(String),

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] StoreError),

    #[error("answer synthesis failed: {0}")]
    Synthesis(#[source] CompletionError),
}

impl EngineError {
    /// Stable machine-readable tag, used in logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::ClassifierUnavailable(_) => "classifier_unavailable",
            Self::ClassificationParse(_) => "classification_parse_error",
            Self::RetrievalUnavailable(_) => "retrieval_unavailable",
            Self::Synthesis(_) => "synthesis_error",
        }
    }

    /// Classifier failures degrade to a generic answer instead of failing the request.
    pub fn is_classifier_failure(&self) -> bool {
        matches!(
            self,
            Self::ClassifierUnavailable(_) | Self::ClassificationParse(_)
        )
    }

    /// Message safe to show an end user. Upstream causes stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidQuery(reason) => format!("Requête invalide : {}", reason),
            Self::RetrievalUnavailable(_) => "search temporarily unavailable".to_string(),
            Self::Synthesis(_) => {
                "answer generation temporarily unavailable".to_string()
            }
            Self::ClassifierUnavailable(_) | Self::ClassificationParse(_) => {
                "classification temporarily unavailable".to_string()
            }
        }
    }
}
