//! Shared utilities

use stru_api::{Button, ChatMessage, Sender};

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// One line per attached button
pub fn format_button(index: usize, button: &Button) -> String {
    format!(
        "  [{}] {} ({})",
        index + 1,
        truncate_chars(&button.value, 60),
        button.file_id
    )
}

/// Count user and assistant messages
pub fn count_by_sender(messages: &[ChatMessage]) -> (usize, usize) {
    messages.iter().fold((0, 0), |(user, assistant), m| match m.sender {
        Sender::User => (user + 1, assistant),
        Sender::Assistant => (user, assistant + 1),
    })
}
