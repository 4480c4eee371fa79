//! Core types shared by the decoder, the HTTP clients and the chat layer

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A button attached to an assistant message, pointing at a server-side file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Identifier of the file the button refers to
    pub file_id: String,
    /// Display label
    pub value: String,
}

impl Button {
    pub fn new(file_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            value: value.into(),
        }
    }
}

/// One entry of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Accumulated text; grows while the message is streaming
    pub text: String,
    pub sender: Sender,
    /// Model that produced the message (assistant only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Buttons in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    /// Creation time in unix milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            model: None,
            buttons: vec![],
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an empty assistant message, to be filled while streaming
    pub fn assistant_empty() -> Self {
        Self {
            text: String::new(),
            sender: Sender::Assistant,
            model: None,
            buttons: vec![],
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }

    /// True when nothing has been streamed into the message yet
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.model.is_none() && self.buttons.is_empty()
    }
}

/// Body of `POST /v1/completion`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "sessionID")]
    pub session_id: Uuid,
    pub message: String,
}

impl CompletionRequest {
    /// Build a request for the given session
    pub fn new(session: &SessionContext, message: impl Into<String>) -> Self {
        Self {
            user_id: session.user_id.clone(),
            session_id: session.session_id,
            message: message.into(),
        }
    }
}

/// Who is talking and under which session.
///
/// Passed explicitly to every call that needs it; nothing is kept in
/// module-level state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub session_id: Uuid,
    /// Server-issued session token, if logged in
    pub token: Option<String>,
}

impl SessionContext {
    /// Start a new chat session for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Uuid::new_v4(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Replace the session id, keeping user and token
    pub fn renew(&mut self) {
        self.session_id = Uuid::new_v4();
    }
}

/// Profile returned by `GET /user_info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub given_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl UserInfo {
    /// Best name to greet the user with
    pub fn display_name(&self) -> &str {
        self.given_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("there")
    }
}

/// How a streamed assistant turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The `[DONE]` sentinel arrived
    Done,
    /// The byte source closed before the sentinel
    Truncated,
    /// The caller aborted the stream
    Cancelled,
}
