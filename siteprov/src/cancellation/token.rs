//! Operator interrupts.

use crate::errors::ProvisionError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Set by the signal handler, polled by the orchestrator between steps.
///
/// A step in flight is never aborted; the run stops before the next one.
/// Only the first reason is kept.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the run stop.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            let reason = reason.into();
            debug!(reason = %reason, "Cancellation requested");
            *slot = Some(reason);
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The first cancellation reason.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Fails with [`ProvisionError::Interrupted`] if cancelled.
    pub fn check(&self) -> Result<(), ProvisionError> {
        if !self.is_cancelled() {
            return Ok(());
        }
        Err(ProvisionError::Interrupted(
            self.reason().unwrap_or_else(|| "cancelled".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("interrupted by operator");
        token.cancel("second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("interrupted by operator"));
    }

    #[test]
    fn test_check_maps_to_exit_130() {
        let token = CancellationToken::new();
        token.cancel("ctrl-c");
        let err = token.check().unwrap_err();
        assert_eq!(err.exit_code(), 130);
        assert_eq!(err.to_string(), "Run interrupted: ctrl-c");
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = Arc::new(CancellationToken::new());
        let remote = Arc::clone(&token);
        std::thread::spawn(move || remote.cancel("signal")).join().unwrap();
        assert!(token.is_cancelled());
    }
}
