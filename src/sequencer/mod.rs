//! Sequencer.
//!
//! - [`token`] - Token request/response shapes and transaction resolution
//! - [`server`] - The epoch-fenced sequencer, its router, and failover
//!
//! # Invariants
//!
//! - Addresses issued by one sequencer are strictly increasing and never overlap
//! - A sequencer whose epoch is not the fence's epoch refuses every operation
//! - After failover, the first new address is above every address in the log

pub mod server;
pub mod token;

pub use server::{failover, Sequencer, SequencerClient, SequencerRouter};
pub use token::{
    BackpointerWalk, Token, TokenRequest, TokenResponse, TxnResolution, MAX_TOKEN_ADDRESSES,
};
