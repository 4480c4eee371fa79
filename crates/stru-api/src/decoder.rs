//! Incremental decoder for the completion stream
//!
//! The completion endpoint answers with a line-oriented body:
//!
//! ```text
//! data: {"type":"model","value":"stru-large"}
//! data: {"type":"text","value":"Hel"}
//! data: {"type":"text","value":"lo"}
//! data: {"type":"button","file_id":"f1","value":"report.pdf"}
//! data: [DONE]
//! ```
//!
//! Bytes arrive in arbitrary buffers. A line, or a single UTF-8 character,
//! may be split across any number of them.

use crate::error::DecodeError;
use crate::stream::StreamEvent;
use serde::Deserialize;

/// Prefix that marks a line as an event
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of decoding one complete `data:` line
pub type Decoded = std::result::Result<StreamEvent, DecodeError>;

/// Tagged record carried by a `data:` line
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Payload {
    Text {
        value: String,
    },
    Model {
        value: String,
    },
    Button {
        file_id: String,
        value: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct Tag {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse the payload of a `data:` line (prefix and whitespace already stripped).
///
/// Returns `Ok(None)` for a well-formed record with an unrecognized `type`.
pub fn parse_payload(payload: &str) -> std::result::Result<Option<StreamEvent>, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    if payload == DONE_SENTINEL {
        return Ok(Some(StreamEvent::Done));
    }

    let parsed: Payload =
        serde_json::from_str(payload).map_err(|source| DecodeError::Malformed {
            payload: payload.to_string(),
            source,
        })?;

    Ok(match parsed {
        Payload::Text { value } => Some(StreamEvent::Text { value }),
        Payload::Model { value } => Some(StreamEvent::Model { value }),
        Payload::Button { file_id, value } => Some(StreamEvent::Button { file_id, value }),
        Payload::Unknown => {
            let kind = serde_json::from_str::<Tag>(payload)
                .map(|t| t.kind)
                .unwrap_or_default();
            tracing::debug!(kind = %kind, "ignoring stream event with unknown type");
            None
        }
    })
}

/// Turns raw body buffers into [`StreamEvent`]s.
///
/// Each call to [`push`](Self::push) handles one buffer to completion. After
/// the `[DONE]` sentinel (or [`finish`](Self::finish)) every further call is a
/// no-op and the internal buffers are released.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    /// Text after the last newline seen so far
    pending_line: String,
    done: bool,
    closed: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been decoded
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the decoder accepts no more input
    pub fn is_closed(&self) -> bool {
        self.done || self.closed
    }

    /// Feed one buffer, returning the events of every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        let mut out = Vec::new();
        if self.is_closed() || chunk.is_empty() {
            return out;
        }

        let text = self.decode_utf8(chunk);
        if text.is_empty() {
            return out;
        }

        let search_from = self.pending_line.len();
        self.pending_line.push_str(&text);
        let Some(pos) = self.pending_line[search_from..].rfind('\n') else {
            return out;
        };

        let rest = self.pending_line.split_off(search_from + pos + 1);
        let complete = std::mem::replace(&mut self.pending_line, rest);

        for line in complete[..complete.len() - 1].split('\n') {
            if let Some(item) = self.process_line(line) {
                out.push(item);
                if self.done {
                    break;
                }
            }
        }
        out
    }

    /// Signal that the byte source is exhausted.
    ///
    /// A carried line without a trailing newline is decoded as a final line.
    pub fn finish(&mut self) -> Vec<Decoded> {
        let mut out = Vec::new();
        if self.is_closed() {
            return out;
        }

        if !self.pending_bytes.is_empty() {
            tracing::warn!(
                bytes = self.pending_bytes.len(),
                "stream ended inside a UTF-8 sequence"
            );
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_line.push_str(&tail);
        }

        let line = std::mem::take(&mut self.pending_line);
        if !line.trim().is_empty() {
            if let Some(item) = self.process_line(&line) {
                out.push(item);
            }
        }
        self.close();
        out
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending_bytes = Vec::new();
        self.pending_line = String::new();
    }

    /// Decode as much of the pending bytes as possible, keeping an incomplete
    /// trailing sequence for the next buffer.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(self.pending_bytes.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending_bytes[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending_bytes.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(
                        &self.pending_bytes[start..valid_end],
                    ));
                    match e.error_len() {
                        Some(len) => {
                            tracing::warn!(len, "replacing invalid UTF-8 in stream");
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending_bytes.drain(..start);
        text
    }

    fn process_line(&mut self, line: &str) -> Option<Decoded> {
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            if !line.trim().is_empty() {
                tracing::trace!(line, "skipping non-data line");
            }
            return None;
        };

        match parse_payload(rest.trim()) {
            Ok(Some(StreamEvent::Done)) => {
                self.done = true;
                self.close();
                Some(Ok(StreamEvent::Done))
            }
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed stream line");
                Some(Err(e))
            }
        }
    }
}
