//! stru-chat: chat session runtime
//!
//! This crate owns the conversation transcript and runs user turns against a
//! [`Transport`], folding the streamed answer into the open assistant message
//! and publishing [`ChatEvent`]s for front ends.

pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod transport;

pub use conversation::Conversation;
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use session::ChatSession;
pub use transport::{HttpTransport, RetryConfig, Transport};
