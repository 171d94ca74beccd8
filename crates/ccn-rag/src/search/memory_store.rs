//! In-process passage store backed by a JSON corpus.
//!
//! Scoring is lexical: the share of distinct query terms (accent-folded,
//! stop-words removed) found in the passage. Passages sharing no term with the
//! query are not candidates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{AgreementEntry, PassageStore, StoreError};
use crate::text::{content_tokens, fold};
use crate::types::{AgreementId, Passage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    pub id: String,
    pub document_type: String,
    pub text: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub idcc: AgreementId,
    pub name: String,
    #[serde(default)]
    pub passages: Vec<PassageRecord>,
}

pub struct InMemoryPassageStore {
    agreements: RwLock<Vec<AgreementRecord>>,
}

impl InMemoryPassageStore {
    pub fn new(records: Vec<AgreementRecord>) -> Self {
        let store = Self::empty();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn empty() -> Self {
        Self {
            agreements: RwLock::new(Vec::new()),
        }
    }

    /// Load a corpus file: a JSON array of agreement records.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file {}", path.display()))?;
        let records: Vec<AgreementRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corpus file {}", path.display()))?;

        let passages: usize = records.iter().map(|r| r.passages.len()).sum();
        tracing::info!(
            agreements = records.len(),
            passages = passages,
            path = %path.display(),
            "Loaded agreement corpus"
        );
        Ok(Self::new(records))
    }

    /// Insert an agreement, replacing any record with the same IDCC.
    pub fn insert(&self, record: AgreementRecord) {
        let mut agreements = self.agreements.write();
        match agreements.iter_mut().find(|a| a.idcc == record.idcc) {
            Some(existing) => *existing = record,
            None => agreements.push(record),
        }
    }

    pub fn agreement_count(&self) -> usize {
        self.agreements.read().len()
    }
}

fn lexical_score(query_terms: &HashSet<String>, text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms: HashSet<String> = content_tokens(text).into_iter().collect();
    let matched = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
    matched as f32 / query_terms.len() as f32
}

fn source_label(record: &AgreementRecord, passage: &PassageRecord) -> String {
    if passage.source.trim().is_empty() {
        format!("IDCC {} - {}", record.idcc, passage.document_type)
    } else {
        passage.source.clone()
    }
}

#[async_trait]
impl PassageStore for InMemoryPassageStore {
    async fn search_passages(
        &self,
        agreement: &AgreementId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Passage>, StoreError> {
        let agreements = self.agreements.read();
        let Some(record) = agreements.iter().find(|a| &a.idcc == agreement) else {
            return Ok(Vec::new());
        };

        let query_terms: HashSet<String> = content_tokens(query).into_iter().collect();
        let mut scored: Vec<(f32, &PassageRecord)> = record
            .passages
            .iter()
            .map(|p| (lexical_score(&query_terms, &p.text), p))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable: equal scores keep corpus order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, p)| Passage {
                id: p.id.clone(),
                agreement_id: record.idcc.clone(),
                document_type: p.document_type.clone(),
                text: p.text.clone(),
                relevance_score: score,
                source_label: source_label(record, p),
            })
            .collect())
    }

    async fn find_agreement_by_name(&self, name: &str) -> Result<Option<AgreementId>, StoreError> {
        let wanted = fold(name.trim());
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .agreements
            .read()
            .iter()
            .find(|a| fold(a.name.trim()) == wanted)
            .map(|a| a.idcc.clone()))
    }

    async fn list_agreements(&self) -> Result<Vec<AgreementEntry>, StoreError> {
        Ok(self
            .agreements
            .read()
            .iter()
            .map(|a| AgreementEntry {
                id: a.idcc.clone(),
                name: a.name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AgreementId {
        AgreementId::parse(raw).unwrap()
    }

    fn store() -> InMemoryPassageStore {
        InMemoryPassageStore::new(vec![AgreementRecord {
            idcc: id("1979"),
            name: "Hôtels, cafés, restaurants".into(),
            passages: vec![
                PassageRecord {
                    id: "p1".into(),
                    document_type: "TEXTE_BASE".into(),
                    text: "Le préavis de démission est d'une semaine.".into(),
                    source: "Article 30".into(),
                },
                PassageRecord {
                    id: "p2".into(),
                    document_type: "AVENANT".into(),
                    text: "Durée du préavis et période d'essai.".into(),
                    source: String::new(),
                },
                PassageRecord {
                    id: "p3".into(),
                    document_type: "ANNEXE".into(),
                    text: "Grille des salaires minima.".into(),
                    source: "Annexe I".into(),
                },
            ],
        }])
    }

    #[tokio::test]
    async fn test_search_scores_and_filters() {
        let results = store()
            .search_passages(&id("1979"), "préavis de démission", 10)
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(results[0].relevance_score, 1.0);
        assert_eq!(results[1].relevance_score, 0.5);
        assert_eq!(results[1].source_label, "IDCC 1979 - AVENANT");
    }

    #[tokio::test]
    async fn test_search_respects_top_k_and_scope() {
        let s = store();
        assert_eq!(s.search_passages(&id("1979"), "préavis", 1).await.unwrap().len(), 1);
        assert!(s.search_passages(&id("0016"), "préavis", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_without_matching_terms_is_empty() {
        let results = store()
            .search_passages(&id("1979"), "télétravail", 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_name_is_accent_insensitive() {
        let s = store();
        assert_eq!(
            s.find_agreement_by_name("hotels, CAFES, restaurants").await.unwrap(),
            Some(id("1979"))
        );
        assert_eq!(s.find_agreement_by_name("bâtiment").await.unwrap(), None);
        assert_eq!(s.find_agreement_by_name("  ").await.unwrap(), None);
    }

    #[test]
    fn test_insert_replaces_same_idcc() {
        let s = store();
        s.insert(AgreementRecord {
            idcc: id("1979"),
            name: "HCR".into(),
            passages: Vec::new(),
        });
        assert_eq!(s.agreement_count(), 1);
    }

    #[test]
    fn test_corpus_json_shape() {
        let records: Vec<AgreementRecord> = serde_json::from_str(
            r#"[{"idcc":"843","name":"Boulangerie-pâtisserie","passages":[{"id":"a","document_type":"ARRETE","text":"..."}]}]"#,
        )
        .unwrap();
        assert_eq!(records[0].idcc.as_str(), "0843");
        assert_eq!(records[0].passages[0].source, "");
    }
}
