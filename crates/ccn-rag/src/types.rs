use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reranking::DocumentTypeTag;

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Agreement identifier
// ============================================================================

/// IDCC code of a collective agreement, always stored as 4 zero-padded digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgreementId(String);

impl AgreementId {
    /// Normalize a raw code ("16", "843", " 1979 ") into its 4-digit form.
    ///
    /// Accepts 1 to 4 ASCII digits; anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.trim();
        if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(format!("{:0>4}", digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgreementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgreementId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("'{}' is not a valid IDCC code", value))
    }
}

impl From<AgreementId> for String {
    fn from(id: AgreementId) -> Self {
        id.0
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Greetings, meta questions, anything that needs no agreement text.
    GeneralQuestion,
    /// The user names an agreement (or its sector) and wants it identified.
    IdccIdentification,
    /// A question about the content of a specific agreement.
    CcnSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub agreement_id: Option<AgreementId>,
    pub agreement_name: Option<String>,
    pub confidence: f32,
}

impl Classification {
    pub fn new(
        intent: Intent,
        agreement_id: Option<AgreementId>,
        agreement_name: Option<String>,
        confidence: f32,
    ) -> Self {
        Self {
            intent,
            agreement_id,
            agreement_name,
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn general(confidence: f32) -> Self {
        Self::new(Intent::GeneralQuestion, None, None, confidence)
    }

    pub fn ccn_search(agreement_id: AgreementId, confidence: f32) -> Self {
        Self::new(Intent::CcnSearch, Some(agreement_id), None, confidence)
    }

    /// Classification used when every classifier stage failed.
    pub fn fallback() -> Self {
        Self::general(0.0)
    }
}

/// Clamp a self-reported confidence into [0, 1]; NaN counts as no confidence.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    Medium,
    Long,
}

impl ResponseLength {
    /// Lenient parsing of a caller-supplied mode; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "short" | "court" | "courte" => Some(Self::Short),
            "medium" | "moyen" | "moyenne" => Some(Self::Medium),
            "long" | "longue" | "detailed" | "détaillé" | "détaillée" => Some(Self::Long),
            _ => None,
        }
    }
}

/// One user request. Built once at the boundary and never mutated.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub text: String,
    pub idcc: Option<AgreementId>,
    pub top_k: Option<usize>,
    pub history: Vec<Turn>,
    pub response_length: Option<ResponseLength>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_idcc(mut self, idcc: AgreementId) -> Self {
        self.idcc = Some(idcc);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_response_length(mut self, length: ResponseLength) -> Self {
        self.response_length = Some(length);
        self
    }
}

// ============================================================================
// Passages
// ============================================================================

/// A passage as returned by the store, before legal ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub agreement_id: AgreementId,
    /// Raw document-type label as stored (e.g. "Arrêté d'extension", "AVENANT").
    pub document_type: String,
    pub text: String,
    pub relevance_score: f32,
    pub source_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    #[serde(flatten)]
    pub passage: Passage,
    pub type_tag: DocumentTypeTag,
    pub tier: u8,
    pub tier_label: String,
}

/// Passages ordered by legal tier, then relevance. Serialized as a plain array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedContext {
    passages: Vec<RankedPassage>,
}

impl RankedContext {
    pub(crate) fn from_sorted(passages: Vec<RankedPassage>) -> Self {
        Self { passages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedPassage> {
        self.passages.iter()
    }

    pub fn passages(&self) -> &[RankedPassage] {
        &self.passages
    }
}

impl<'a> IntoIterator for &'a RankedContext {
    type Item = &'a RankedPassage;
    type IntoIter = std::slice::Iter<'a, RankedPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.iter()
    }
}
