//! Streaming event types and utilities

use crate::decoder::StreamDecoder;
use crate::error::{Error, Result};
use crate::types::{Button, ChatMessage};
use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Events decoded from a completion stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text fragment to append to the open message
    Text { value: String },
    /// Name of the model producing the answer
    Model { value: String },
    /// Button attached to the answer
    Button { file_id: String, value: String },
    /// The `[DONE]` sentinel
    Done,
}

impl StreamEvent {
    /// Check if this is the terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// A stream of decoded events.
///
/// `Err` items carrying [`Error::Decode`] report a dropped line and the stream
/// continues; any other `Err` is the last item.
pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Drive a [`StreamDecoder`] from a body byte stream.
///
/// Ends after `[DONE]`, when `bytes` is exhausted, on the first transport
/// error, or as soon as `cancel` fires. The byte source is dropped when the
/// returned stream ends, which releases the underlying connection.
pub fn decode_byte_stream<S, B, E>(bytes: S, cancel: CancellationToken) -> StreamEventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<Error> + Send,
{
    Box::pin(stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = StreamDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("completion stream cancelled");
                    return;
                }
                next = bytes.next() => next,
            };

            let decoded = match next {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    yield Err(e.into());
                    return;
                }
                None => {
                    let tail = decoder.finish();
                    if !decoder.is_done() {
                        tracing::debug!("completion body ended without [DONE]");
                    }
                    tail
                }
            };

            let finished = decoder.is_closed();
            for item in decoded {
                // Consumers may cancel between items of the same buffer
                if cancel.is_cancelled() {
                    return;
                }
                yield item.map_err(Error::from);
            }
            if finished {
                return;
            }
        }
    })
}

/// Fold one event into a message in place. Returns `true` if the message changed.
pub fn apply_event(message: &mut ChatMessage, event: &StreamEvent) -> bool {
    match event {
        StreamEvent::Text { value } => {
            message.text.push_str(value);
            !value.is_empty()
        }
        StreamEvent::Model { value } => {
            if message.model.is_some() {
                tracing::debug!(model = %value, "model announced again, replacing");
            }
            message.model = Some(value.clone());
            true
        }
        StreamEvent::Button { file_id, value } => {
            message.buttons.push(Button::new(file_id.clone(), value.clone()));
            true
        }
        StreamEvent::Done => false,
    }
}
