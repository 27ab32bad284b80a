//! Optimistic transactions.
//!
//! - [`context`] - Per-transaction snapshots, read footprint, write buffer
//! - [`resolver`] - Commit-time conflict resolution
//! - [`manager`] - Transaction API
//!
//! # Guarantees
//!
//! - A transaction that only writes never aborts
//! - A read stream that gained an intersecting entry after its snapshot aborts the commit
//! - Commits are all-or-nothing: one log entry at one address

pub mod context;
pub mod manager;
pub mod resolver;

pub use context::{ConflictGranularity, TransactionState};
pub use manager::{Transaction, TransactionManager};
