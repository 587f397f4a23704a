//! Run context: progress reporting and cancellation
//!
//! These let the reconciler be driven from a terminal, a server, or a test
//! without depending on any particular UI.

use crate::types::ResourceOutcome;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for reconciliation runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called once before the first resource, with the number of resources
    fn on_run_start(&mut self, _total: usize) {}

    /// Called when starting to reconcile a single resource
    fn on_resource_start(&mut self, name: &str, description: &str);

    /// Called when a resource completes
    fn on_resource_complete(&mut self, name: &str, outcome: &ResourceOutcome);

    /// Called after the last resource, before state is saved
    fn on_run_complete(&mut self) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&mut self, _name: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _name: &str, _outcome: &ResourceOutcome) {}
}

/// Cooperative cancellation signal
///
/// Raising it stops a run from starting further resources; a provider call
/// already in flight is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
    }
}
