//! Cooperative abort signalling between the control path and a run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag set by the abort path and polled by the run loop.
///
/// Clones observe the same flag. Setting it never interrupts anything by
/// itself; the owner checks it at each suspension point.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    requested: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Creates a flag in the cleared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Repeated requests are harmless.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
