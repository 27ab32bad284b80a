//! The shared log's data model.
//!
//! - [`address`] - Global address line and closed address ranges
//! - [`stream`] - Stream identifiers
//! - [`entry`] - Log entries, mutations, checkpoint metadata
//! - [`tail`] - Global and per-stream tail tracking
//! - [`unit`] - Log-unit collaborator contract and in-memory implementation

pub mod address;
pub mod entry;
pub mod stream;
pub mod tail;
pub mod unit;
