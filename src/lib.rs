//! Tessera - sequencer, layout management, and optimistic transactions for a
//! distributed shared log.
//!
//! Tessera is the coordination core of a Corfu-style shared log. A single
//! epoch-fenced sequencer hands out globally ordered addresses; streams are
//! logical sub-sequences of the log linked by backpointers; cluster layouts
//! are reconfigured through an epoch-fenced consensus step; and transactions
//! validate optimistically against per-stream snapshots at commit time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Transactions                           │
//! │        lazy snapshots │ buffered writes │ conflict resolver     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Sequencer (one per epoch)                   │
//! │       token issuance │ stream tails │ backpointer chains        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Log Unit + Tails                         │
//! │        write-once addresses │ sealing │ hole fill │ replay      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Control Plane                          │
//! │    layout │ epoch fence │ consensus │ detector │ recovery       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Node runtime orchestration
//! - [`core::time`] - Sleep abstraction and retry intervals
//! - [`core::error`] - Error taxonomy
//!
//! ## Log
//! - [`log::address`] - Addresses and closed address ranges
//! - [`log::stream`] - Stream identifiers
//! - [`log::entry`] - Log entries, mutations, checkpoints
//! - [`log::tail`] - Stream tail tracking
//! - [`log::unit`] - Log unit contract and in-memory unit
//!
//! ## Sequencer
//! - [`sequencer::token`] - Token requests and responses
//! - [`sequencer::server`] - Epoch-fenced sequencer, router, failover
//!
//! ## Control Plane
//! - [`control::layout`] - Cluster layout
//! - [`control::epoch`] - Epoch fence
//! - [`control::store`] - Persisted layout
//! - [`control::consensus`] - Layout proposals and cluster view
//! - [`control::detector`] - Failure detector and poll reports
//! - [`control::recovery`] - Layout recovery
//!
//! ## Transactions
//! - [`txn::context`] - Per-transaction state
//! - [`txn::resolver`] - Conflict resolution
//! - [`txn::manager`] - Transaction API
//!
//! ## Protocol
//! - [`protocol::messages`] - Request/response variants
//! - [`protocol::codec`] - Binary framing
//! - [`protocol::service`] - Request dispatch
//!
//! ## Operations
//! - [`ops::observability`] - Metrics registry
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - **Tail monotonicity**: tails only ever move forward, whatever the update order
//! - **Address uniqueness**: one sequencer never issues overlapping ranges
//! - **Epoch fencing**: a new epoch's first address is above every earlier one
//! - **One layout per epoch**: at most one proposal per epoch is accepted
//! - **Write-only commits**: transactions that only write never abort

// Core infrastructure
pub mod core;

// Shared log data model
pub mod log;

// Sequencer
pub mod sequencer;

// Layout management
pub mod control;

// Transactions
pub mod txn;

// Wire protocol
pub mod protocol;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime, time};
pub use control::{consensus, detector, epoch, layout, recovery, store};
pub use log::{address, entry, stream, tail, unit};
pub use ops::observability;
