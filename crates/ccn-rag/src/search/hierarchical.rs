//! Hierarchical retrieval: fetch candidate passages for one agreement, then
//! rank them by legal authority before relevance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{PassageStore, StoreError};
use crate::config::RetrievalConfig;
use crate::error::EngineError;
use crate::reranking::rank_passages;
use crate::types::{AgreementId, RankedContext};

pub struct HierarchicalRetriever {
    store: Arc<dyn PassageStore>,
    default_top_k: usize,
    max_top_k: usize,
    timeout: Duration,
}

impl HierarchicalRetriever {
    pub fn new(store: Arc<dyn PassageStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
            timeout: config.timeout(),
        }
    }

    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k)
    }

    pub async fn retrieve(
        &self,
        agreement: &AgreementId,
        query_text: &str,
        top_k: Option<usize>,
    ) -> Result<RankedContext, EngineError> {
        let top_k = self.effective_top_k(top_k);
        let start = Instant::now();

        let mut passages = tokio::time::timeout(
            self.timeout,
            self.store.search_passages(agreement, query_text, top_k),
        )
        .await
        .map_err(|_| EngineError::RetrievalUnavailable(StoreError::Timeout(self.timeout)))?
        .map_err(EngineError::RetrievalUnavailable)?;

        let fetched = passages.len();
        passages.retain(|p| &p.agreement_id == agreement);
        if passages.len() != fetched {
            tracing::warn!(
                idcc = %agreement,
                dropped = fetched - passages.len(),
                "Store returned passages outside the requested agreement"
            );
        }
        passages.truncate(top_k);

        let ranked = rank_passages(passages);
        tracing::info!(
            idcc = %agreement,
            top_k = top_k,
            passages = ranked.len(),
            tiers = ?ranked.iter().map(|p| p.tier).collect::<Vec<_>>(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Hierarchical retrieval complete"
        );
        Ok(ranked)
    }
}
