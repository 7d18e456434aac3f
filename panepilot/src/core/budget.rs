//! Context budget helpers.
//!
//! Token counts are a character-ratio estimate; no tokenizer is involved.

use crate::core::types::ChatMessage;

const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate for a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated tokens across a message history.
pub fn estimate_history(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|message| estimate_tokens(&message.content))
        .sum()
}

/// True when sending `next` on top of `history` would exceed `max_context_size`.
pub fn needs_squash(history: &[ChatMessage], next: &str, max_context_size: usize) -> bool {
    estimate_history(history) + estimate_tokens(next) > max_context_size
}

/// Context usage as a percentage of `max_context_size`, for `/info`.
pub fn usage_percent(tokens: usize, max_context_size: usize) -> f64 {
    if max_context_size == 0 {
        return 0.0;
    }
    tokens as f64 / max_context_size as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up_per_character() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn squash_triggers_only_over_budget() {
        let history = vec![ChatMessage::user("a".repeat(40)), ChatMessage::assistant("b".repeat(40))];
        assert!(!needs_squash(&history, &"c".repeat(40), 30));
        assert!(needs_squash(&history, &"c".repeat(44), 30));
        assert!(!needs_squash(&[], "", 0));
    }

    #[test]
    fn usage_percent_handles_zero_budget() {
        assert_eq!(usage_percent(50, 0), 0.0);
        assert_eq!(usage_percent(50, 200), 25.0);
    }
}
