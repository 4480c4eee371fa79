//! stru-api: wire types, stream decoding and HTTP clients
//!
//! This crate talks to the stru completion and identity services and turns the
//! streamed completion body into typed events.

pub mod client;
pub mod decoder;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{CompletionClient, DEFAULT_BASE_URL, IdentityClient};
pub use decoder::StreamDecoder;
pub use error::{DecodeError, Error, Result};
pub use stream::{StreamEvent, StreamEventStream, apply_event, decode_byte_stream};
pub use types::*;
