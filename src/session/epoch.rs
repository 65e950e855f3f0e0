//! Monotonic session epoch
//!
//! Advanced exactly once before each open attempt. Callbacks carry the epoch
//! they were created under and are ignored once it is no longer current.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionEpoch(AtomicU64);

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new epoch and return it
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}
