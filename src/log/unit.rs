//! Log-unit collaborator.
//!
//! The durable storage engine is outside the core. The core only relies on
//! the contract captured by [`LogUnit`]: write-once addresses, reads by
//! address or stepped range, epoch sealing, and ordered replay for
//! sequencer bootstrap. [`InMemoryLogUnit`] implements the contract for
//! tests and standalone nodes.

use crate::core::error::{TesseraError, TesseraResult};
use crate::log::address::{Address, AddressRange};
use crate::log::entry::LogEntry;
use crate::log::tail::{StreamTailTracker, TailState};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Durable log-append / log-read service keyed by address.
pub trait LogUnit: Send + Sync {
    /// Write an entry at its address. Addresses are write-once.
    fn write(&self, entry: LogEntry) -> TesseraResult<()>;

    /// Read one address. `None` means nothing has been written there yet.
    fn read(&self, address: Address) -> TesseraResult<Option<LogEntry>>;

    /// Read every `step`-th address of a closed range.
    ///
    /// Unwritten addresses are omitted from the result.
    fn read_range(&self, range: AddressRange, step: u32) -> TesseraResult<BTreeMap<Address, LogEntry>>;

    /// Fill an unwritten address with a hole so readers can move past it.
    fn fill_hole(&self, address: Address, epoch: u64) -> TesseraResult<()>;

    /// Reject all future writes stamped with an epoch below `epoch`.
    fn seal(&self, epoch: u64) -> TesseraResult<()>;

    /// Epoch the unit is currently sealed at.
    fn sealed_epoch(&self) -> u64;

    /// Tails observed from everything written so far.
    fn tails(&self) -> TailState;

    /// Every written entry, in address order.
    fn replay(&self) -> TesseraResult<Vec<LogEntry>>;
}

struct UnitInner {
    entries: BTreeMap<Address, LogEntry>,
    tails: StreamTailTracker,
    sealed_epoch: u64,
}

/// In-memory log unit.
pub struct InMemoryLogUnit {
    inner: RwLock<UnitInner>,
}

impl InMemoryLogUnit {
    /// Create an empty, unsealed log unit.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(UnitInner {
                entries: BTreeMap::new(),
                tails: StreamTailTracker::new(),
                sealed_epoch: 0,
            }),
        }
    }

    /// Number of written addresses (data and holes).
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    fn check_epoch(inner: &UnitInner, epoch: u64) -> TesseraResult<()> {
        if epoch < inner.sealed_epoch {
            return Err(TesseraError::Sealed {
                sealed_epoch: inner.sealed_epoch,
                write_epoch: epoch,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryLogUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl LogUnit for InMemoryLogUnit {
    fn write(&self, entry: LogEntry) -> TesseraResult<()> {
        if !entry.address.is_address() {
            return Err(TesseraError::invalid("cannot write at NON_ADDRESS"));
        }
        let mut inner = self.inner.write();
        Self::check_epoch(&inner, entry.epoch)?;
        if inner.entries.contains_key(&entry.address) {
            return Err(TesseraError::Overwrite {
                address: entry.address,
            });
        }
        inner.tails.update(&entry);
        inner.entries.insert(entry.address, entry);
        Ok(())
    }

    fn read(&self, address: Address) -> TesseraResult<Option<LogEntry>> {
        Ok(self.inner.read().entries.get(&address).cloned())
    }

    fn read_range(&self, range: AddressRange, step: u32) -> TesseraResult<BTreeMap<Address, LogEntry>> {
        if step == 0 {
            return Err(TesseraError::invalid("range read step must be > 0"));
        }
        if range.start > range.end {
            return Err(TesseraError::invalid(format!("read range {range} is inverted")));
        }
        let inner = self.inner.read();
        let step = u64::from(step);
        Ok(inner
            .entries
            .range(range.start..=range.end)
            .filter(|(address, _)| address.get().abs_diff(range.start.get()) % step == 0)
            .map(|(address, entry)| (*address, entry.clone()))
            .collect())
    }

    fn fill_hole(&self, address: Address, epoch: u64) -> TesseraResult<()> {
        if !address.is_address() {
            return Err(TesseraError::invalid("cannot fill a hole at NON_ADDRESS"));
        }
        let mut inner = self.inner.write();
        Self::check_epoch(&inner, epoch)?;
        match inner.entries.get(&address) {
            Some(existing) if existing.is_hole() => Ok(()),
            Some(_) => Err(TesseraError::Overwrite { address }),
            None => {
                let hole = LogEntry::hole(address).with_epoch(epoch);
                inner.tails.update(&hole);
                inner.entries.insert(address, hole);
                Ok(())
            }
        }
    }

    fn seal(&self, epoch: u64) -> TesseraResult<()> {
        let mut inner = self.inner.write();
        if epoch < inner.sealed_epoch {
            return Err(TesseraError::wrong_epoch(inner.sealed_epoch, epoch));
        }
        inner.sealed_epoch = epoch;
        tracing::debug!(epoch, "log unit sealed");
        Ok(())
    }

    fn sealed_epoch(&self) -> u64 {
        self.inner.read().sealed_epoch
    }

    fn tails(&self) -> TailState {
        self.inner.read().tails.snapshot()
    }

    fn replay(&self) -> TesseraResult<Vec<LogEntry>> {
        Ok(self.inner.read().entries.values().cloned().collect())
    }
}
