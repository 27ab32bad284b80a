//! Error types for the shared log core.
//!
//! Staleness and transaction conflicts are ordinary, recoverable outcomes.
//! They are cheap to construct and callers are expected to match on them
//! rather than treat them as fatal. Address-resolution and malformed-reply
//! failures abort the operation in progress and are surfaced unchanged.

use crate::log::address::Address;
use crate::log::stream::StreamId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error conditions raised by the sequencer, log unit, layout
/// management, and transaction layers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TesseraError {
    /// The sequencer's epoch is no longer the authoritative layout epoch.
    ///
    /// Callers re-resolve the layout and retry against the new sequencer.
    #[error("stale sequencer: sequencer epoch {sequencer_epoch}, layout epoch {layout_epoch}")]
    StaleSequencer {
        sequencer_epoch: u64,
        layout_epoch: u64,
    },

    /// A request was stamped with an epoch other than the receiver's.
    #[error("wrong epoch: expected {expected}, observed {observed}")]
    WrongEpoch { expected: u64, observed: u64 },

    /// Commit-time conflict; the transaction left no visible effects.
    #[error("transaction aborted on stream {stream}: snapshot {snapshot}, observed {observed} ({cause})")]
    TransactionAborted {
        stream: StreamId,
        snapshot: Address,
        observed: Address,
        cause: AbortCause,
    },

    /// The transaction was already committed or aborted.
    #[error("transaction already resolved: {state}")]
    TransactionResolved { state: String },

    /// A node address could not be resolved.
    #[error("empty address for node {node:?}")]
    EmptyAddress { node: String },

    /// A peer replied with something that does not fit the request.
    #[error("malformed reply: {message}")]
    MalformedReply { message: String },

    /// Attempted to write an address that already holds data.
    #[error("address {address} already written")]
    Overwrite { address: Address },

    /// The log unit is sealed at a newer epoch than the write.
    #[error("log unit sealed at epoch {sealed_epoch}, write epoch {write_epoch}")]
    Sealed { sealed_epoch: u64, write_epoch: u64 },

    /// A probed node did not answer.
    #[error("node {node} unreachable")]
    NodeUnreachable { node: String },

    /// Invalid request.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Encoding or decoding a wire message failed.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Persisted state could not be read or written.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Why a transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    /// A newer entry on a read stream intersects the read footprint.
    Conflict,
    /// The conflict window contains an address that is not readable yet.
    UnreadableHistory,
    /// The sequencer saw a write that landed after client-side validation.
    SequencerRace,
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(f, "Conflict"),
            Self::UnreadableHistory => write!(f, "UnreadableHistory"),
            Self::SequencerRace => write!(f, "SequencerRace"),
        }
    }
}

impl TesseraError {
    /// Create a StaleSequencer error.
    pub fn stale_sequencer(sequencer_epoch: u64, layout_epoch: u64) -> Self {
        Self::StaleSequencer {
            sequencer_epoch,
            layout_epoch,
        }
    }

    /// Create a WrongEpoch error.
    pub fn wrong_epoch(expected: u64, observed: u64) -> Self {
        Self::WrongEpoch { expected, observed }
    }

    /// Create a TransactionAborted error.
    pub fn aborted(stream: StreamId, snapshot: Address, observed: Address, cause: AbortCause) -> Self {
        Self::TransactionAborted {
            stream,
            snapshot,
            observed,
            cause,
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a MalformedReply error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedReply {
            message: message.into(),
        }
    }

    /// Check if the caller may retry the operation after refreshing state.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StaleSequencer { .. }
                | Self::WrongEpoch { .. }
                | Self::TransactionAborted { .. }
                | Self::NodeUnreachable { .. }
        )
    }

    /// Check if the caller must fetch a fresh layout before retrying.
    pub fn requires_layout_refresh(&self) -> bool {
        matches!(
            self,
            Self::StaleSequencer { .. } | Self::WrongEpoch { .. } | Self::Sealed { .. }
        )
    }

    /// Check if this is a transaction abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::TransactionAborted { .. })
    }
}

/// Result type using TesseraError.
pub type TesseraResult<T> = Result<T, TesseraError>;
