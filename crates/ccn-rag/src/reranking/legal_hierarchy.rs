//! Legal-authority reranking for agreement passages.
//!
//! Every stored document type maps to one authority tier. Ranking sorts by
//! tier first and only then by the store's relevance score, so a binding
//! arrêté always precedes an annex however well the annex matches the query.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::text::normalize_label;
use crate::types::{Passage, RankedContext, RankedPassage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentTypeTag {
    ArreteExtension,
    ArreteAgrement,
    Arrete,
    Avenant,
    AccordSalaires,
    AccordPrevoyance,
    AccordFormation,
    AccordRetraite,
    Accord,
    Annexe,
    TexteBase,
    Unknown,
}

impl DocumentTypeTag {
    pub const ALL: [DocumentTypeTag; 12] = [
        Self::ArreteExtension,
        Self::ArreteAgrement,
        Self::Arrete,
        Self::Avenant,
        Self::AccordSalaires,
        Self::AccordPrevoyance,
        Self::AccordFormation,
        Self::AccordRetraite,
        Self::Accord,
        Self::Annexe,
        Self::TexteBase,
        Self::Unknown,
    ];

    /// Map a raw stored label to its tag. Total: anything unrecognized is `Unknown`.
    pub fn from_label(raw: &str) -> Self {
        match normalize_label(raw).as_str() {
            "ARRETE_EXTENSION" | "ARRETE_D_EXTENSION" => Self::ArreteExtension,
            "ARRETE_AGREMENT" | "ARRETE_D_AGREMENT" => Self::ArreteAgrement,
            "ARRETE" => Self::Arrete,
            "AVENANT" => Self::Avenant,
            "ACCORD_SALAIRES" | "ACCORD_SALAIRE" | "ACCORD_DE_SALAIRES" => Self::AccordSalaires,
            "ACCORD_PREVOYANCE" | "ACCORD_DE_PREVOYANCE" => Self::AccordPrevoyance,
            "ACCORD_FORMATION" | "ACCORD_DE_FORMATION" => Self::AccordFormation,
            "ACCORD_RETRAITE" | "ACCORD_DE_RETRAITE" => Self::AccordRetraite,
            "ACCORD" => Self::Accord,
            "ANNEXE" => Self::Annexe,
            "TEXTE_BASE" | "TEXTE_DE_BASE" => Self::TexteBase,
            _ => Self::Unknown,
        }
    }

    /// Authority tier, 1 (binding) to 6 (unclassified).
    pub fn tier(self) -> u8 {
        match self {
            Self::ArreteExtension | Self::ArreteAgrement | Self::Arrete => 1,
            Self::Avenant => 2,
            Self::AccordSalaires
            | Self::AccordPrevoyance
            | Self::AccordFormation
            | Self::AccordRetraite => 3,
            Self::Accord | Self::TexteBase => 4,
            Self::Annexe => 5,
            Self::Unknown => 6,
        }
    }

    pub fn tier_label(self) -> &'static str {
        tier_label(self.tier())
    }
}

/// Human-readable label cited in answers for each tier.
pub fn tier_label(tier: u8) -> &'static str {
    match tier {
        1 => "Arrêté (force obligatoire)",
        2 => "Avenant (modifie le texte de base)",
        3 => "Accord thématique",
        4 => "Texte conventionnel",
        5 => "Annexe (valeur indicative)",
        _ => "Document non classé",
    }
}

fn annotate(passage: Passage) -> RankedPassage {
    let type_tag = DocumentTypeTag::from_label(&passage.document_type);
    let tier = type_tag.tier();
    RankedPassage {
        passage,
        type_tag,
        tier,
        tier_label: tier_label(tier).to_string(),
    }
}

/// NaN scores sort last within their tier.
fn score_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Sort passages by `(tier, -relevance)`. The sort is stable, so equal keys
/// keep their retrieval order and identical inputs always rank identically.
pub fn rank_passages(passages: Vec<Passage>) -> RankedContext {
    let mut ranked: Vec<RankedPassage> = passages.into_iter().map(annotate).collect();
    ranked.sort_by(|a, b| {
        a.tier.cmp(&b.tier).then_with(|| {
            score_key(b.passage.relevance_score)
                .partial_cmp(&score_key(a.passage.relevance_score))
                .unwrap_or(Ordering::Equal)
        })
    });
    RankedContext::from_sorted(ranked)
}
