//! Text shaping for chat delivery.

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut truncated = text.chars().take(keep).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Splits `text` into chunks of at most `max_chars` characters, preferring to
/// break after a newline when one falls inside the window.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    let chars = text.chars().collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = start.saturating_add(max_chars).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            if let Some(offset) = chars[start..hard_end].iter().rposition(|ch| *ch == '\n') {
                if offset > 0 {
                    end = start + offset + 1;
                }
            }
        }
        chunks.push(chars[start..end].iter().collect::<String>());
        start = end;
    }
    chunks
}
