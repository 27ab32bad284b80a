//! Token request and response shapes.

use crate::log::address::{Address, AddressRange};
use crate::log::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Most addresses a single token request may reserve.
pub const MAX_TOKEN_ADDRESSES: u64 = 1 << 16;

/// Outcome of walking one stream's backpointer chain over a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpointerWalk {
    /// Addresses of the stream inside the window, newest first.
    pub addresses: Vec<Address>,
    /// False when a trim or a checkpoint cut the chain above the window start.
    pub complete: bool,
}

/// Transaction resolution carried on a commit-time token request.
///
/// Each entry says "this stream has been validated through this address".
/// The sequencer refuses the token if any stream has moved past it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnResolution {
    pub read_set: BTreeMap<StreamId, Address>,
}

/// Request for a contiguous range of new addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Streams the reserved addresses will belong to.
    pub streams: BTreeSet<StreamId>,
    /// Number of addresses to reserve.
    pub num_addresses: u64,
    /// Optional conditional-commit check.
    pub txn_resolution: Option<TxnResolution>,
}

impl TokenRequest {
    /// Reserve `num_addresses` on the given streams.
    pub fn new(streams: impl IntoIterator<Item = StreamId>, num_addresses: u64) -> Self {
        Self {
            streams: streams.into_iter().collect(),
            num_addresses,
            txn_resolution: None,
        }
    }

    /// Reserve a single address on the given streams.
    pub fn single(streams: impl IntoIterator<Item = StreamId>) -> Self {
        Self::new(streams, 1)
    }

    /// Attach a transaction resolution check.
    pub fn with_resolution(mut self, resolution: TxnResolution) -> Self {
        self.txn_resolution = Some(resolution);
        self
    }
}

/// A granted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Epoch of the sequencer that issued the token.
    pub epoch: u64,
    /// Reserved addresses.
    pub range: AddressRange,
    /// Previous tail of every requested stream, for backpointer construction.
    pub backpointers: BTreeMap<StreamId, Address>,
}

impl Token {
    /// First reserved address.
    pub fn address(&self) -> Address {
        self.range.start
    }
}

/// Sequencer reply to a [`TokenRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenResponse {
    /// Addresses reserved.
    Issued(Token),
    /// Transaction resolution failed; nothing was reserved.
    Aborted {
        stream: StreamId,
        validated: Address,
        tail: Address,
    },
}

impl TokenResponse {
    /// The granted token, if any.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::Issued(token) => Some(token),
            Self::Aborted { .. } => None,
        }
    }

    /// Consume into the granted token, if any.
    pub fn into_token(self) -> Option<Token> {
        match self {
            Self::Issued(token) => Some(token),
            Self::Aborted { .. } => None,
        }
    }

    /// Check if the request was refused by resolution.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
