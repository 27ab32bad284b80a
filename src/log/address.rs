//! Global address line.
//!
//! Every log entry sits at a unique 64-bit address. Comparison between
//! addresses is the only happened-before relation in the system; there is
//! no wall-clock ordering.

use crate::core::error::{TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};

/// A position on the global log.
///
/// [`Address::NON_ADDRESS`] sorts below every real address, so max-based
/// tail bookkeeping needs no special casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(i64);

impl Address {
    /// "No data here yet."
    pub const NON_ADDRESS: Address = Address(-1);

    /// The first address ever handed out.
    pub const ZERO: Address = Address(0);

    /// Create an address from its raw value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Check whether this is a real address rather than the sentinel.
    pub const fn is_address(self) -> bool {
        self.0 >= 0
    }

    /// The address immediately after this one.
    ///
    /// `NON_ADDRESS.next()` is [`Address::ZERO`].
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Advance by `n` addresses, or `None` past the end of the address line.
    pub fn checked_offset(self, n: u64) -> Option<Self> {
        let n = i64::try_from(n).ok()?;
        self.0.checked_add(n).map(Self)
    }

    /// Keep the larger of two addresses.
    pub fn max_with(self, other: Address) -> Self {
        std::cmp::max(self, other)
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::NON_ADDRESS
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_address() {
            write!(f, "@{}", self.0)
        } else {
            write!(f, "@none")
        }
    }
}

impl From<i64> for Address {
    fn from(raw: i64) -> Self {
        Self::new(raw)
    }
}

/// A closed interval of addresses, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: Address,
    pub end: Address,
}

impl AddressRange {
    /// Create a closed range. Both ends must be real addresses and `start <= end`.
    pub fn closed(start: Address, end: Address) -> TesseraResult<Self> {
        if !start.is_address() || !end.is_address() {
            return Err(TesseraError::invalid(format!(
                "range bounds must be real addresses: [{}, {}]",
                start, end
            )));
        }
        if start > end {
            return Err(TesseraError::invalid(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// A range holding exactly one address.
    pub fn singleton(address: Address) -> TesseraResult<Self> {
        Self::closed(address, address)
    }

    /// The `n` addresses starting at `first`.
    pub fn starting_at(first: Address, n: u64) -> TesseraResult<Self> {
        if n == 0 {
            return Err(TesseraError::invalid("range must cover at least one address"));
        }
        let end = first.checked_offset(n - 1).ok_or_else(|| {
            TesseraError::invalid(format!("range of {n} addresses from {first} overflows"))
        })?;
        Self::closed(first, end)
    }

    /// Check if an address is inside the range.
    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address <= self.end
    }

    /// Number of addresses covered.
    pub fn len(&self) -> u64 {
        (self.end.get() - self.start.get()) as u64 + 1
    }

    /// A closed range is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether two ranges share any address.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Every `step`-th address from `start` through `end`.
    pub fn stepped(&self, step: u32) -> impl Iterator<Item = Address> {
        let step = step.max(1) as usize;
        (self.start.get()..=self.end.get())
            .step_by(step)
            .map(Address::new)
    }

    /// All addresses in the range.
    pub fn iter(&self) -> impl Iterator<Item = Address> {
        self.stepped(1)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start.get(), self.end.get())
    }
}
