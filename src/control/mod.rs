//! Control plane: layouts, epochs, and reconfiguration.
//!
//! - [`layout`] - Layout shape, endpoints, and validation
//! - [`epoch`] - Epoch fence shared by every epoch-bound component
//! - [`store`] - Persisted "last known layout"
//! - [`consensus`] - Layout proposal primitive and cluster layout view
//! - [`detector`] - Failure detector producing poll reports
//! - [`recovery`] - Layout recovery after restart or failure
//! - [`membership`] - Adding and removing nodes
//!
//! # Epoch Fencing
//!
//! At most one layout is accepted per epoch. Anything bound to an epoch
//! (sequencer, sealed log, recovering node) checks against the shared
//! [`epoch::EpochFence`] and fails fast once the cluster has moved on.

pub mod consensus;
pub mod detector;
pub mod epoch;
pub mod layout;
pub mod membership;
pub mod recovery;
pub mod store;
