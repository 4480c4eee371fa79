//! Chat event types

use serde::{Deserialize, Serialize};
use stru_api::{Button, ChatMessage, Completion};

/// Events published while a turn runs.
///
/// Front ends append `MessageUpdate` deltas as they arrive; the full message
/// is carried by `MessageStart` and `MessageEnd`. Every accepted send ends
/// with exactly one `TurnEnd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The user's message was appended
    UserMessage { message: ChatMessage },

    /// The assistant message was opened
    MessageStart { message: ChatMessage },

    /// Text was appended to the open message
    MessageUpdate { delta: String },

    /// The model name was announced
    ModelSet { model: String },

    /// A button was attached
    ButtonAdded { button: Button },

    /// A stream line was dropped
    DecodeWarning { message: String },

    /// The assistant message was closed
    MessageEnd {
        message: ChatMessage,
        completion: Completion,
    },

    /// The turn failed
    Error { message: String },

    /// The turn is over; `None` when it failed
    TurnEnd { completion: Option<Completion> },
}

impl ChatEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::TurnEnd { .. })
    }
}
