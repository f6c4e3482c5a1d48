use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::WriteError;

/// Write-once holder for the first failure of a write task.
///
/// Shared between the task's thread and delivery callbacks running on the
/// producer's threads. The first [`try_set`](Self::try_set) wins; later
/// failures are counted and dropped. Nothing ever clears it.
#[derive(Debug, Default)]
pub struct ErrorState {
    first: OnceLock<WriteError>,
    discarded: AtomicU64,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `error` if no failure was captured yet. Returns whether this
    /// call won.
    pub fn try_set(&self, error: WriteError) -> bool {
        match self.first.set(error) {
            Ok(()) => true,
            Err(_) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn get(&self) -> Option<&WriteError> {
        self.first.get()
    }

    pub fn is_set(&self) -> bool {
        self.first.get().is_some()
    }

    /// Returns the captured failure, leaving it in place.
    pub fn check(&self) -> Result<(), WriteError> {
        match self.first.get() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Failures that lost the race to an earlier one.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}
