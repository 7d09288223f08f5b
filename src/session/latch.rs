//! One-shot teardown latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// First caller of [`TeardownLatch::try_acquire`] wins; every later call,
/// from any clone, gets `false`.
#[derive(Debug, Clone, Default)]
pub struct TeardownLatch(Arc<AtomicBool>);

impl TeardownLatch {
    /// Untripped latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns `true` only for the call that tripped it.
    pub fn try_acquire(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Whether the latch has been tripped.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
