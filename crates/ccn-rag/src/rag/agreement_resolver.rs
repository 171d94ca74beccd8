//! Turns a classification into the agreement a query is scoped to.
//!
//! An explicit identifier always wins. A name is tried as an exact registry
//! match first, then by similarity over the whole registry.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::search::{PassageStore, StoreError};
use crate::text::name_similarity;
use crate::types::{AgreementId, Classification, Intent};

pub struct AgreementResolver {
    store: Arc<dyn PassageStore>,
    min_similarity: f32,
    timeout: Duration,
}

impl AgreementResolver {
    pub fn new(store: Arc<dyn PassageStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            min_similarity: config.classification.min_name_similarity,
            timeout: config.retrieval.timeout(),
        }
    }

    pub async fn resolve(
        &self,
        classification: &Classification,
    ) -> Result<Option<AgreementId>, EngineError> {
        let name = classification
            .agreement_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        match classification.intent {
            Intent::GeneralQuestion => Ok(None),
            Intent::CcnSearch => match (&classification.agreement_id, name) {
                (Some(id), _) => Ok(Some(id.clone())),
                (None, Some(name)) => self.lookup_name(name).await,
                (None, None) => Ok(None),
            },
            Intent::IdccIdentification => match (name, &classification.agreement_id) {
                (Some(name), fallback) => Ok(self.lookup_name(name).await?.or_else(|| fallback.clone())),
                (None, id) => Ok(id.clone()),
            },
        }
    }

    async fn lookup_name(&self, name: &str) -> Result<Option<AgreementId>, EngineError> {
        if let Some(id) = AgreementId::parse(name) {
            return Ok(Some(id));
        }

        let exact = self.bounded(self.store.find_agreement_by_name(name)).await?;
        if exact.is_some() {
            tracing::debug!(name = name, idcc = ?exact.as_ref().map(|id| id.as_str()), "Agreement name matched exactly");
            return Ok(exact);
        }

        let registry = self.bounded(self.store.list_agreements()).await?;
        let mut best: Option<(f32, &AgreementId)> = None;
        for entry in &registry {
            let score = name_similarity(name, &entry.name);
            if score >= self.min_similarity && best.map_or(true, |(top, _)| score > top) {
                best = Some((score, &entry.id));
            }
        }

        match best {
            Some((score, id)) => {
                tracing::info!(name = name, idcc = %id, similarity = score, "Agreement resolved by name similarity");
                Ok(Some(id.clone()))
            }
            None => {
                tracing::info!(name = name, candidates = registry.len(), "No agreement matches the given name");
                Ok(None)
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| EngineError::RetrievalUnavailable(StoreError::Timeout(self.timeout)))?
            .map_err(EngineError::RetrievalUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{AgreementRecord, InMemoryPassageStore};

    fn id(raw: &str) -> AgreementId {
        AgreementId::parse(raw).unwrap()
    }

    fn resolver() -> AgreementResolver {
        let store = InMemoryPassageStore::new(vec![
            AgreementRecord {
                idcc: id("1979"),
                name: "Hôtels, cafés, restaurants (HCR)".into(),
                passages: Vec::new(),
            },
            AgreementRecord {
                idcc: id("843"),
                name: "Boulangerie-pâtisserie artisanale".into(),
                passages: Vec::new(),
            },
            AgreementRecord {
                idcc: id("1486"),
                name: "Bureaux d'études techniques, cabinets d'ingénieurs-conseils et sociétés de conseils".into(),
                passages: Vec::new(),
            },
        ]);
        AgreementResolver::new(Arc::new(store), &EngineConfig::default())
    }

    fn named(intent: Intent, name: &str) -> Classification {
        Classification::new(intent, None, Some(name.into()), 0.8)
    }

    #[tokio::test]
    async fn test_general_question_has_no_scope() {
        assert_eq!(resolver().resolve(&Classification::general(1.0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_explicit_identifier_wins() {
        let c = Classification::new(
            Intent::CcnSearch,
            Some(id("2216")),
            Some("Boulangerie-pâtisserie artisanale".into()),
            0.9,
        );
        assert_eq!(resolver().resolve(&c).await.unwrap(), Some(id("2216")));
    }

    #[tokio::test]
    async fn test_exact_name_match() {
        let c = named(Intent::IdccIdentification, "boulangerie-patisserie artisanale");
        assert_eq!(resolver().resolve(&c).await.unwrap(), Some(id("0843")));
    }

    #[tokio::test]
    async fn test_partial_name_match() {
        let c = named(Intent::IdccIdentification, "boulangerie pâtisserie");
        assert_eq!(resolver().resolve(&c).await.unwrap(), Some(id("0843")));

        let c = named(Intent::CcnSearch, "hôtels cafés restaurants");
        assert_eq!(resolver().resolve(&c).await.unwrap(), Some(id("1979")));
    }

    #[tokio::test]
    async fn test_unrelated_name_is_unresolved() {
        let c = named(Intent::IdccIdentification, "métallurgie");
        assert_eq!(resolver().resolve(&c).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_name_that_is_a_number() {
        let c = named(Intent::IdccIdentification, "16");
        assert_eq!(resolver().resolve(&c).await.unwrap(), Some(id("0016")));
    }

    #[tokio::test]
    async fn test_search_without_id_or_name() {
        let c = Classification::new(Intent::CcnSearch, None, None, 0.5);
        assert_eq!(resolver().resolve(&c).await.unwrap(), None);
    }
}
