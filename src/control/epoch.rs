//! Layout epoch fence.
//!
//! Every component that must stop serving when the layout moves on holds
//! an `Arc<EpochFence>`. The layout manager advances the fence when a new
//! layout is installed; components compare their own epoch against it.

use crate::core::error::{TesseraError, TesseraResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, monotonically increasing view of the authoritative layout epoch.
#[derive(Debug)]
pub struct EpochFence {
    current: AtomicU64,
}

impl EpochFence {
    /// Create a fence at the given epoch.
    pub fn new(initial_epoch: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_epoch),
        }
    }

    /// Current authoritative epoch.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Move the fence forward. Returns false if `epoch` is not newer.
    pub fn advance_to(&self, epoch: u64) -> bool {
        let prev = self.current.fetch_max(epoch, Ordering::AcqRel);
        if epoch > prev {
            tracing::info!(old_epoch = prev, new_epoch = epoch, "layout epoch advanced");
            true
        } else {
            false
        }
    }

    /// Reject requests stamped with any epoch other than the current one.
    pub fn validate(&self, request_epoch: u64) -> TesseraResult<()> {
        let current = self.current();
        if request_epoch != current {
            return Err(TesseraError::wrong_epoch(current, request_epoch));
        }
        Ok(())
    }
}
