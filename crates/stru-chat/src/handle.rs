//! A cloneable handle for poking a chat session from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for aborting the in-flight turn.
///
/// All fields are `Arc`-wrapped, so cloning is cheap. Safe to use from a
/// signal handler task while the session is awaiting the stream.
#[derive(Clone)]
pub struct ChatHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) is_streaming: Arc<AtomicBool>,
}

impl ChatHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the current stream. No-op when idle.
    pub fn abort(&self) {
        if self.is_streaming() {
            tracing::debug!("aborting in-flight completion");
        }
        self.cancel.lock().cancel();
    }

    /// Whether a turn is currently streaming.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Acquire)
    }

    /// Install a fresh token for a new turn and mark the session busy.
    ///
    /// The turn ends when the returned guard is dropped, including when the
    /// future driving it is dropped mid-stream.
    pub(crate) fn begin_turn(&self) -> TurnGuard {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.is_streaming.store(true, Ordering::Release);
        TurnGuard {
            handle: self.clone(),
            token,
        }
    }
}

/// Keeps the session busy for the lifetime of one turn
pub(crate) struct TurnGuard {
    handle: ChatHandle,
    token: CancellationToken,
}

impl TurnGuard {
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        // Stops a byte source that outlived an abandoned turn
        self.token.cancel();
        self.handle.is_streaming.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_cancels_current_turn() {
        let handle = ChatHandle::new();
        let turn = handle.begin_turn();
        let token = turn.token();
        assert!(handle.is_streaming());

        handle.clone().abort();
        assert!(token.is_cancelled());

        drop(turn);
        assert!(!handle.is_streaming());
    }

    #[test]
    fn test_new_turn_gets_fresh_token() {
        let handle = ChatHandle::new();
        let first = handle.begin_turn().token();

        let second = handle.begin_turn();
        assert!(first.is_cancelled());
        assert!(!second.token().is_cancelled());
    }

    #[test]
    fn test_dropped_guard_ends_turn() {
        let handle = ChatHandle::new();
        let turn = handle.begin_turn();
        let token = turn.token();
        drop(turn);

        assert!(!handle.is_streaming());
        assert!(token.is_cancelled());
    }
}
