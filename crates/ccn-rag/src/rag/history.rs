//! Bounded views over the caller-owned conversation log.

use crate::types::Turn;

/// The last `n` turns, oldest first.
pub fn recent_turns(history: &[Turn], n: usize) -> &[Turn] {
    &history[history.len().saturating_sub(n)..]
}

/// Role-prefixed, newline-joined transcript: `user: ...\nassistant: ...`.
pub fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .map(|t| format!("{}: {}", t.role.as_str(), t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
