//! Accent-insensitive text helpers shared by label mapping, name resolution
//! and the in-memory store's lexical scoring.

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// French function words and agreement boilerplate that carry no signal.
const STOPWORDS: &[&str] = &[
    "a", "au", "aux", "avec", "ce", "ces", "d", "dans", "de", "des", "du", "en", "est", "et",
    "il", "je", "l", "la", "le", "les", "leur", "mon", "ma", "mes", "ne", "nous", "ou", "par",
    "pas", "pour", "qu", "que", "quel", "quelle", "quels", "quelles", "qui", "sa", "se", "ses",
    "son", "sur", "un", "une", "vous", "y", "convention", "collective", "nationale",
];

/// Lower-case and strip diacritics: "Arrêté d'Extension" -> "arrete d'extension".
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Canonical form of a stored label: folded, upper-case, non-alphanumeric runs
/// collapsed to single underscores. "Arrêté d'extension" -> "ARRETE_D_EXTENSION".
pub fn normalize_label(raw: &str) -> String {
    let folded = fold(raw).to_uppercase();
    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Folded word tokens, without stop-words.
pub fn content_tokens(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Similarity between an agreement name typed by a user and a registry name.
///
/// Dice coefficient over content-token sets, raised to 0.9 x containment when
/// every user token appears in the candidate (users type partial names).
pub fn name_similarity(query: &str, candidate: &str) -> f32 {
    let a: HashSet<String> = content_tokens(query).into_iter().collect();
    let b: HashSet<String> = content_tokens(candidate).into_iter().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count() as f32;
    let dice = 2.0 * shared / (a.len() + b.len()) as f32;
    let containment = shared / a.len() as f32;
    if containment >= 1.0 {
        dice.max(0.9 * containment)
    } else {
        dice
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
