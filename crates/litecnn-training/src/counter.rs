//! Shared iteration counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonically increasing step counter shared by training workers.
///
/// Clones observe and advance the same count. Only the counter itself is
/// atomic; nothing else is ordered by it.
#[derive(Debug, Clone, Default)]
pub struct IterationCounter {
    inner: Arc<AtomicU64>,
}

impl IterationCounter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the new value.
    pub fn increment(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the current value.
    pub fn get(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}
