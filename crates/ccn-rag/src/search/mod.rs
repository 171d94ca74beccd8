//! Passage store interface and the legal-hierarchy retriever built on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::{AgreementId, Passage};

pub mod hierarchical;
pub mod memory_store;
pub mod rest_store;

pub use hierarchical::HierarchicalRetriever;
pub use memory_store::{AgreementRecord, InMemoryPassageStore, PassageRecord};
pub use rest_store::RestPassageStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("passage store timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to reach passage store: {0}")]
    Transport(String),

    #[error("passage store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed passage store response: {0}")]
    Malformed(String),
}

/// An entry of the agreement name registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementEntry {
    pub id: AgreementId,
    pub name: String,
}

/// Query interface over the materialized agreements and passages.
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Up to `top_k` passages of `agreement`, each scored against `query`.
    async fn search_passages(
        &self,
        agreement: &AgreementId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Passage>, StoreError>;

    /// Exact (case- and accent-insensitive) lookup of an agreement by name.
    async fn find_agreement_by_name(&self, name: &str) -> Result<Option<AgreementId>, StoreError>;

    /// Full name registry, used for fuzzy resolution.
    async fn list_agreements(&self) -> Result<Vec<AgreementEntry>, StoreError>;
}
