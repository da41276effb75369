//! Splits long replies into Telegram-sized messages.
//!
//! Telegram caps messages at 4096 characters; 4000 leaves headroom for
//! formatting. Splitting is greedy and line-based: lines are packed into a
//! chunk until the next one would not fit, and lines are never broken up.
//! A single line longer than the limit becomes its own oversized chunk and
//! is left to Telegram to refuse.

/// Character budget per outgoing message.
pub const MAX_MESSAGE_CHARS: usize = 4000;

pub fn chunk_message(text: &str) -> Vec<String> {
    chunk_with_limit(text, MAX_MESSAGE_CHARS)
}

fn chunk_with_limit(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    // Counted in chars, tracked alongside to avoid rescanning the buffer
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(line);
            current_len = line_len;
        } else {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
