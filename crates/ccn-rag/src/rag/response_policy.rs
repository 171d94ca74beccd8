//! Answer length policy: token budget and style instruction per mode.

use crate::types::ResponseLength;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePolicy {
    pub length: ResponseLength,
    pub max_tokens: usize,
    pub instruction: &'static str,
}

const SHORT: ResponsePolicy = ResponsePolicy {
    length: ResponseLength::Short,
    max_tokens: 500,
    instruction: "Réponds de façon concise en 2-3 phrases, en allant directement à l'essentiel.",
};

const MEDIUM: ResponsePolicy = ResponsePolicy {
    length: ResponseLength::Medium,
    max_tokens: 1500,
    instruction: "Réponds de façon structurée et complète, en quelques paragraphes courts.",
};

const LONG: ResponsePolicy = ResponsePolicy {
    length: ResponseLength::Long,
    max_tokens: 3000,
    instruction: "Réponds de façon détaillée : explique chaque règle applicable, ses conditions et ses exceptions, et cite systématiquement les sources (type de texte et référence) entre crochets.",
};

impl ResponsePolicy {
    /// Absent mode means medium.
    pub fn select(length: Option<ResponseLength>) -> Self {
        match length.unwrap_or(ResponseLength::Medium) {
            ResponseLength::Short => SHORT,
            ResponseLength::Medium => MEDIUM,
            ResponseLength::Long => LONG,
        }
    }

    /// Unrecognized modes fall back to medium.
    pub fn select_raw(raw: Option<&str>) -> Self {
        Self::select(raw.and_then(ResponseLength::parse))
    }
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        MEDIUM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budgets() {
        assert_eq!(ResponsePolicy::select(Some(ResponseLength::Short)).max_tokens, 500);
        assert_eq!(ResponsePolicy::select(Some(ResponseLength::Medium)).max_tokens, 1500);
        assert_eq!(ResponsePolicy::select(Some(ResponseLength::Long)).max_tokens, 3000);
    }

    #[test]
    fn test_short_asks_for_two_or_three_sentences() {
        assert!(ResponsePolicy::select(Some(ResponseLength::Short))
            .instruction
            .contains("2-3 phrases"));
    }

    #[test]
    fn test_long_asks_for_citations() {
        assert!(ResponsePolicy::select(Some(ResponseLength::Long))
            .instruction
            .contains("sources"));
    }

    #[test]
    fn test_defaults_to_medium() {
        assert_eq!(ResponsePolicy::select(None), ResponsePolicy::default());
        assert_eq!(ResponsePolicy::select_raw(Some("verbose")).length, ResponseLength::Medium);
        assert_eq!(ResponsePolicy::select_raw(None).length, ResponseLength::Medium);
        assert_eq!(ResponsePolicy::select_raw(Some("court")).length, ResponseLength::Short);
    }
}
