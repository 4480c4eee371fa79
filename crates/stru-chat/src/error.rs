//! Error types for stru-chat

use thiserror::Error;

/// Result type alias using stru-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a chat turn
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the service layer
    #[error(transparent)]
    Api(#[from] stru_api::Error),

    /// A turn is already streaming
    #[error("A response is still streaming")]
    Busy,

    /// Nothing to send
    #[error("Message is empty")]
    EmptyMessage,

    /// An assistant message is already open
    #[error("An assistant message is already open")]
    MessageAlreadyOpen,
}
