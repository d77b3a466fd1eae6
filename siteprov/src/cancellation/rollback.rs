//! Registry of rollback handlers executed in LIFO order.

use crate::context::RunContext;
use crate::core::RollbackOutcome;
use crate::steps::RollbackHandler;
use tracing::{info, warn};

/// Rollback handlers registered by successful steps of one run.
///
/// Handlers run newest first. Running drains the registry, so each handler
/// runs at most once.
#[derive(Default)]
pub struct RollbackRegistry {
    handlers: Vec<Box<dyn RollbackHandler>>,
}

impl RollbackRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    pub fn register(&mut self, handler: Box<dyn RollbackHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of pending handlers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.handlers.len()
    }

    /// Returns the pending handler names in registration order.
    #[must_use]
    pub fn pending_names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    /// Runs all handlers in LIFO order.
    ///
    /// A failing handler does not stop the ones registered before it.
    /// The registry is empty afterwards.
    pub async fn run_all(&mut self, ctx: &mut RunContext) -> Vec<RollbackOutcome> {
        let handlers = std::mem::take(&mut self.handlers);
        let mut outcomes = Vec::with_capacity(handlers.len());

        for handler in handlers.into_iter().rev() {
            let name = handler.name().to_string();
            match handler.rollback(ctx).await {
                Ok(()) => {
                    info!(handler = %name, "Rollback handler completed");
                    outcomes.push(RollbackOutcome { name, error: None });
                }
                Err(e) => {
                    warn!(handler = %name, error = %e, "Rollback handler failed");
                    outcomes.push(RollbackOutcome {
                        name,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcomes
    }

    /// Drops all handlers without running them.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for RollbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackRegistry")
            .field("pending", &self.pending_names())
            .finish()
    }
}
