//! PostgREST-style remote passage store.
//!
//! Endpoints (relative to `base_url`):
//! - `POST rpc/search_passages` with `{p_idcc, p_query, p_top_k}`
//! - `GET agreements?select=idcc,name[&name=ilike.<name>]`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{AgreementEntry, PassageStore, StoreError};
use crate::types::{AgreementId, Passage};

pub struct RestPassageStore {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PassageRow {
    id: serde_json::Value,
    idcc: serde_json::Value,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(alias = "content")]
    text: String,
    #[serde(default, alias = "similarity")]
    score: Option<f32>,
    #[serde(default, alias = "source_label")]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgreementRow {
    idcc: serde_json::Value,
    name: String,
}

impl RestPassageStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            client,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout)
            } else {
                StoreError::Transport(format!("{}: {}", what, e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(format!("{}: {}", what, e)))?;
        if !status.is_success() {
            tracing::error!(status = %status, operation = what, "Passage store returned error");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(format!("{}: {}", what, e)))
    }

    async fn fetch_agreements(&self, name_filter: Option<&str>) -> Result<Vec<AgreementRow>, StoreError> {
        let mut params = vec![("select".to_string(), "idcc,name".to_string())];
        if let Some(name) = name_filter {
            params.push(("name".to_string(), format!("ilike.{}", escape_like(name))));
        }
        let builder = self
            .client
            .get(format!("{}/agreements", self.base_url))
            .query(&params);
        self.send(builder, "list agreements").await
    }
}

/// Escape `%` and `_` so a name is matched literally by `ilike`.
fn escape_like(name: &str) -> String {
    name.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Identifier columns come back as text or as integers depending on the schema.
fn value_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn row_to_passage(row: PassageRow, requested: &AgreementId) -> Result<Passage, StoreError> {
    let raw_idcc = value_text(row.idcc);
    let agreement_id = AgreementId::parse(&raw_idcc)
        .ok_or_else(|| StoreError::Malformed(format!("invalid idcc '{}' in passage row", raw_idcc)))?;
    let id = value_text(row.id);
    let document_type = row.document_type.unwrap_or_default();
    let source_label = row
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("IDCC {} - {}", requested, document_type));
    Ok(Passage {
        id,
        agreement_id,
        document_type,
        text: row.text,
        relevance_score: row.score.unwrap_or(0.0),
        source_label,
    })
}

#[async_trait]
impl PassageStore for RestPassageStore {
    async fn search_passages(
        &self,
        agreement: &AgreementId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Passage>, StoreError> {
        let builder = self
            .client
            .post(format!("{}/rpc/search_passages", self.base_url))
            .json(&json!({
                "p_idcc": agreement.as_str(),
                "p_query": query,
                "p_top_k": top_k,
            }));
        let rows: Vec<PassageRow> = self.send(builder, "search passages").await?;
        tracing::debug!(idcc = %agreement, rows = rows.len(), "Passage store search returned");
        rows.into_iter()
            .map(|row| row_to_passage(row, agreement))
            .collect()
    }

    async fn find_agreement_by_name(&self, name: &str) -> Result<Option<AgreementId>, StoreError> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let rows = self.fetch_agreements(Some(name)).await?;
        Ok(rows
            .into_iter()
            .find_map(|r| AgreementId::parse(&value_text(r.idcc))))
    }

    async fn list_agreements(&self) -> Result<Vec<AgreementEntry>, StoreError> {
        let rows = self.fetch_agreements(None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                AgreementId::parse(&value_text(r.idcc)).map(|id| AgreementEntry { id, name: r.name })
            })
            .collect())
    }
}
