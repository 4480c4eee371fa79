//! Conversation state: the transcript and the currently open assistant message.

use crate::error::{Error, Result};
use stru_api::ChatMessage;

/// The in-memory transcript of one chat session.
///
/// At most one assistant message is open (receiving streamed text) at a time,
/// and it is always the last entry.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    /// Index of the open assistant message
    open: Option<usize>,
    /// Last turn error
    pub error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether an assistant message is receiving text
    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<&ChatMessage> {
        if self.is_streaming() {
            return Err(Error::Busy);
        }
        self.messages.push(ChatMessage::user(text));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Append an empty assistant message and mark it open
    pub fn open_assistant(&mut self) -> Result<&mut ChatMessage> {
        if self.open.is_some() {
            return Err(Error::MessageAlreadyOpen);
        }
        self.messages.push(ChatMessage::assistant_empty());
        let index = self.messages.len() - 1;
        self.open = Some(index);
        Ok(&mut self.messages[index])
    }

    /// The open assistant message, if any
    pub fn open_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.open.map(|i| &mut self.messages[i])
    }

    /// Close the open assistant message, returning a copy of its final state
    pub fn close_open(&mut self) -> Option<ChatMessage> {
        self.open.take().map(|i| self.messages[i].clone())
    }

    /// Drop all messages. Fails while a message is streaming.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::Busy);
        }
        self.messages.clear();
        self.error = None;
        Ok(())
    }
}
