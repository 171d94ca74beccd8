//! Deterministic intent pre-detection.
//!
//! Runs before any network call. Patterns are tried in a fixed order
//! (greetings, meta questions, explicit identifiers); when none matches the
//! detector returns `None` and never guesses.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use super::classifier::{ClassificationRequest, ClassificationStage};
use crate::error::EngineError;
use crate::text::fold;
use crate::types::{AgreementId, Classification};

pub const GREETING_CONFIDENCE: f32 = 1.0;
pub const IDENTIFIER_CONFIDENCE: f32 = 0.9;

/// Longer messages that merely open with "bonjour" are real questions.
const GREETING_MAX_WORDS: usize = 6;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(bonjour|bonsoir|salut|coucou|hello|hi|hey|merci|au revoir|bonne (journée|journee|soirée|soiree)|à bientôt|a bientot|à plus|a plus|thanks|thank you|bye)\b",
    )
    .expect("greeting regex is valid")
});

const META_PATTERNS: &[&str] = &[
    r"quel(le)?\s+(est\s+la\s+)?date\s+(sommes[-\s]nous|on\s+est|est[-\s]on|d'aujourd'hui|aujourd'hui)",
    r"^quelle\s+(est\s+la\s+)?date\s*\??$",
    r"quel\s+jour\s+(sommes[-\s]nous|on\s+est|est[-\s]on|nous\s+sommes|c'est|est-ce)",
    r"on\s+est\s+quel\s+jour",
    r"\bqui\s+(es[-\s]tu|êtes[-\s]vous|etes[-\s]vous)",
    r"\btu\s+es\s+qui\b",
    r"\b(que|qu'est[-\s]ce\s+que\s+tu)\s+(peux|sais)[-\s]?(tu\s+)?faire",
    r"\bque\s+pouvez[-\s]vous\s+faire",
    r"\bwhat\s+(date|day)\s+is\s+(it|today)",
    r"\bwho\s+are\s+you\b",
    r"\bwhat\s+can\s+you\s+do\b",
];

static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&META_PATTERNS.join("|")).expect("meta regex is valid"));

static IDCC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:idcc|ccn)\s*(?:n°|no\.?)?\s*[:\s]?\s*(\d{3,4})\b")
        .expect("idcc regex is valid")
});

static BARE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("bare number regex is valid"));

/// Words after which a 4-digit token reads as a calendar year.
const YEAR_CONTEXT_WORDS: &[&str] = &[
    "en", "depuis", "annee", "an", "janvier", "fevrier", "mars", "avril", "mai", "juin",
    "juillet", "aout", "septembre", "octobre", "novembre", "decembre", "in", "since",
];

/// Units after which a 4-digit token is an amount or a quantity.
const UNIT_WORDS: &[&str] = &[
    "euro", "euros", "eur", "h", "heure", "heures", "jour", "jours", "mois", "ans",
    "salaries", "salarie", "points", "point", "km", "m2",
];

#[derive(Debug, Clone)]
pub struct PreDetector {
    allow_bare_identifiers: bool,
}

impl Default for PreDetector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PreDetector {
    pub fn new(allow_bare_identifiers: bool) -> Self {
        Self {
            allow_bare_identifiers,
        }
    }

    pub fn detect(&self, query: &str) -> Option<Classification> {
        self.detect_with(query, self.allow_bare_identifiers)
    }

    fn detect_with(&self, query: &str, allow_bare: bool) -> Option<Classification> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }

        if GREETING_RE.is_match(&q) && q.split_whitespace().count() <= GREETING_MAX_WORDS {
            return Some(Classification::general(GREETING_CONFIDENCE));
        }

        if META_RE.is_match(&q) {
            return Some(Classification::general(GREETING_CONFIDENCE));
        }

        if let Some(id) = find_identifier(&q, allow_bare) {
            return Some(Classification::ccn_search(id, IDENTIFIER_CONFIDENCE));
        }

        None
    }
}

fn find_identifier(q: &str, allow_bare: bool) -> Option<AgreementId> {
    if let Some(caps) = IDCC_RE.captures(q) {
        return AgreementId::parse(&caps[1]);
    }
    if !allow_bare {
        return None;
    }
    BARE_NUMBER_RE
        .captures_iter(q)
        .filter_map(|caps| caps.get(1))
        .find(|m| !reads_as_year(&q[..m.start()]) && !reads_as_quantity(&q[m.end()..]))
        .and_then(|m| AgreementId::parse(m.as_str()))
}

/// True when the text right before a 4-digit token makes it a date or a year:
/// "01/03/2024", "depuis 2019", "en mars 2023".
fn reads_as_year(before: &str) -> bool {
    let before = before.trim_end();
    if before.ends_with('/') || before.ends_with('-') || before.ends_with('.') {
        return before
            .chars()
            .rev()
            .nth(1)
            .map_or(false, |c| c.is_ascii_digit());
    }
    before
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .last()
        .map_or(false, |w| YEAR_CONTEXT_WORDS.contains(&fold(w).as_str()))
}

/// True when the text right after a 4-digit token makes it an amount or a
/// quantity: "1500 euros", "1600 €", "1607 heures", "1500,50".
fn reads_as_quantity(after: &str) -> bool {
    let mut chars = after.chars();
    if let (Some(',' | '.'), Some(c)) = (chars.next(), chars.next()) {
        if c.is_ascii_digit() {
            return true;
        }
    }
    let after = after.trim_start();
    if after.starts_with('€') || after.starts_with('%') {
        return true;
    }
    after
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .filter(|w| !w.is_empty())
        .map_or(false, |w| UNIT_WORDS.contains(&fold(w).as_str()))
}

#[async_trait]
impl ClassificationStage for PreDetector {
    fn name(&self) -> &'static str {
        "pre_detector"
    }

    async fn try_classify(
        &self,
        request: &ClassificationRequest<'_>,
    ) -> Result<Option<Classification>, EngineError> {
        // A caller-supplied agreement outranks a bare number in the text.
        let allow_bare = self.allow_bare_identifiers && request.explicit_agreement.is_none();
        Ok(self.detect_with(request.text, allow_bare))
    }
}
