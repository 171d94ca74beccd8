//! LLM-Based Intent Classifier
//!
//! One completion call decides the intent of a query that the deterministic
//! stages could not place, and names the collective agreement when the user
//! referred to one. The model must answer with a single JSON object; anything
//! else is a parse failure, never a guessed classification.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::classifier::{ClassificationRequest, ClassificationStage};
use super::history::{format_turns, recent_turns};
use crate::config::ClassificationConfig;
use crate::error::EngineError;
use crate::llm::{estimate_tokens, CompletionError, CompletionProvider, ResponseFormat};
use crate::types::{AgreementId, Classification, Intent};

// ---------------------------------------------------------------------------
// Classifier Prompt
// ---------------------------------------------------------------------------

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"Tu es le routeur d'un assistant spécialisé dans les conventions collectives nationales françaises (CCN). Pour le message de l'utilisateur, réponds avec un objet JSON contenant exactement ces champs :

{"intent":"general_question|idcc_identification|ccn_search","agreement_id":"1234"|null,"agreement_name":"..."|null,"confidence":0.0}

RÈGLES :
- "general_question" : salutations, questions sur l'assistant, culture générale, droit du travail sans convention précise.
- "idcc_identification" : l'utilisateur cherche quelle convention s'applique, ou nomme une convention sans donner son numéro IDCC.
- "ccn_search" : l'utilisateur pose une question sur le contenu d'une convention identifiée (numéro IDCC ou nom explicite), y compris par référence à la conversation.
- agreement_id : le numéro IDCC (1 à 4 chiffres) s'il est mentionné ou déductible de la conversation, sinon null.
- agreement_name : le nom de la convention tel que l'utilisateur l'a écrit, sinon null.
- confidence : nombre entre 0 et 1.

Réponds UNIQUEMENT avec l'objet JSON."#;

fn build_classifier_prompt(text: &str, history: &[crate::types::Turn], turns: usize) -> String {
    let mut parts = Vec::with_capacity(3);
    parts.push(CLASSIFIER_SYSTEM_PROMPT.to_string());

    let transcript = format_turns(recent_turns(history, turns));
    if !transcript.is_empty() {
        parts.push(format!("\nConversation :\n{}", transcript));
    }

    parts.push(format!("\nMessage : \"{}\"\nJSON :", text.trim()));
    parts.join("\n")
}

// ---------------------------------------------------------------------------
// Response Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    agreement_id: Value,
    #[serde(default)]
    agreement_name: Option<String>,
    confidence: Value,
}

fn parse_intent(raw: &str) -> Option<Intent> {
    let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
    match key.as_str() {
        "general_question" | "general" => Some(Intent::GeneralQuestion),
        "idcc_identification" | "identification" => Some(Intent::IdccIdentification),
        "ccn_search" | "search" => Some(Intent::CcnSearch),
        _ => None,
    }
}

fn parse_confidence(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

fn parse_agreement_id(value: &Value) -> Option<AgreementId> {
    let raw = match value {
        Value::String(s) => s.trim().to_lowercase(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let digits = raw
        .trim_start_matches("idcc")
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    AgreementId::parse(digits)
}

/// Parse the model's answer into a Classification.
/// Tolerates markdown fences and surrounding prose; rejects everything else.
fn parse_classifier_response(raw: &str) -> Result<Classification, EngineError> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => {
            return Err(EngineError::ClassificationParse(
                "no JSON object in classifier response".to_string(),
            ))
        }
    };

    let parsed: RawClassification = serde_json::from_str(json_str)
        .map_err(|e| EngineError::ClassificationParse(e.to_string()))?;

    let intent = parse_intent(&parsed.intent).ok_or_else(|| {
        EngineError::ClassificationParse(format!("unknown intent '{}'", parsed.intent))
    })?;
    let confidence = parse_confidence(&parsed.confidence).ok_or_else(|| {
        EngineError::ClassificationParse(format!("invalid confidence {}", parsed.confidence))
    })?;

    let agreement_id = parse_agreement_id(&parsed.agreement_id);
    if agreement_id.is_none() && !parsed.agreement_id.is_null() {
        tracing::debug!(value = %parsed.agreement_id, "Ignoring unusable agreement_id from classifier");
    }

    Ok(Classification::new(
        intent,
        agreement_id,
        parsed.agreement_name,
        confidence,
    ))
}

// ---------------------------------------------------------------------------
// Classifier Stage
// ---------------------------------------------------------------------------

pub struct LlmClassifier {
    llm: Arc<dyn CompletionProvider>,
    history_turns: usize,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn CompletionProvider>, config: &ClassificationConfig) -> Self {
        Self {
            llm,
            history_turns: config.history_turns,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        }
    }

    pub async fn classify(
        &self,
        text: &str,
        history: &[crate::types::Turn],
    ) -> Result<Classification, EngineError> {
        let prompt = build_classifier_prompt(text, history, self.history_turns);
        let prompt_tokens = estimate_tokens(&prompt);

        let start = Instant::now();
        let raw_response = tokio::time::timeout(
            self.timeout,
            self.llm.complete(&prompt, self.max_tokens, ResponseFormat::Json),
        )
        .await
        .map_err(|_| EngineError::ClassifierUnavailable(CompletionError::Timeout(self.timeout)))?
        .map_err(EngineError::ClassifierUnavailable)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let classification = parse_classifier_response(&raw_response)?;

        tracing::info!(
            intent = ?classification.intent,
            idcc = ?classification.agreement_id.as_ref().map(|id| id.as_str()),
            name = ?classification.agreement_name,
            confidence = classification.confidence,
            prompt_tokens = prompt_tokens,
            completion_tokens = estimate_tokens(&raw_response),
            latency_ms = latency_ms,
            "LLM classifier decision"
        );

        Ok(classification)
    }
}

#[async_trait]
impl ClassificationStage for LlmClassifier {
    fn name(&self) -> &'static str {
        "llm_classifier"
    }

    async fn try_classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Option<Classification>, EngineError> {
        self.classify(request.text, request.history).await.map(Some)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
