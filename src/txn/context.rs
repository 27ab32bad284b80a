//! Per-transaction bookkeeping.

use crate::log::address::Address;
use crate::log::entry::Mutation;
use crate::log::stream::StreamId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Transaction lifecycle. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Open,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Open)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Open => write!(f, "open"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How finely conflicts are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictGranularity {
    /// Any new entry on a read stream conflicts.
    Stream,
    /// Only new entries touching a key that was read conflict.
    #[default]
    Key,
}

impl std::str::FromStr for ConflictGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(ConflictGranularity::Stream),
            "key" => Ok(ConflictGranularity::Key),
            other => Err(format!("unknown conflict granularity {other:?}")),
        }
    }
}

/// What a transaction read from one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFootprint {
    /// The whole stream was read.
    Stream,
    /// Only these keys were read.
    Keys(BTreeSet<Bytes>),
}

impl ReadFootprint {
    /// Widen the footprint by one more read.
    fn record(&mut self, key: Option<&Bytes>) {
        match (self, key) {
            (ReadFootprint::Keys(keys), Some(key)) => {
                keys.insert(key.clone());
            }
            (footprint, None) => *footprint = ReadFootprint::Stream,
            (ReadFootprint::Stream, Some(_)) => {}
        }
    }

    /// Check whether a committed mutation intersects this footprint.
    pub fn intersects(&self, mutation: &Mutation) -> bool {
        match (self, &mutation.key) {
            (ReadFootprint::Stream, _) => true,
            (ReadFootprint::Keys(_), None) => true,
            (ReadFootprint::Keys(keys), Some(key)) => keys.contains(key),
        }
    }
}

/// Snapshots, read footprint, and buffered writes of one transaction.
#[derive(Debug, Clone)]
pub struct TxnContext {
    pub id: u64,
    pub state: TransactionState,
    /// Stream tail at first touch.
    snapshots: BTreeMap<StreamId, Address>,
    read_set: BTreeMap<StreamId, ReadFootprint>,
    write_set: Vec<Mutation>,
}

impl TxnContext {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: TransactionState::Open,
            snapshots: BTreeMap::new(),
            read_set: BTreeMap::new(),
            write_set: Vec::new(),
        }
    }

    /// Snapshot of a stream, if it has been touched.
    pub fn snapshot(&self, stream: &StreamId) -> Option<Address> {
        self.snapshots.get(stream).copied()
    }

    /// Record the first-touch tail of a stream. Later calls keep the first value.
    pub fn touch(&mut self, stream: StreamId, tail: Address) -> Address {
        *self.snapshots.entry(stream).or_insert(tail)
    }

    /// Record a read. `key` of `None` reads the whole stream.
    pub fn record_read(&mut self, stream: StreamId, key: Option<&Bytes>) {
        self.read_set
            .entry(stream)
            .or_insert_with(|| match key {
                Some(_) => ReadFootprint::Keys(BTreeSet::new()),
                None => ReadFootprint::Stream,
            })
            .record(key);
    }

    /// Buffer a write.
    pub fn buffer(&mut self, mutation: Mutation) {
        self.write_set.push(mutation);
    }

    pub fn read_set(&self) -> &BTreeMap<StreamId, ReadFootprint> {
        &self.read_set
    }

    pub fn write_set(&self) -> &[Mutation] {
        &self.write_set
    }

    /// Streams the buffered writes target.
    pub fn write_streams(&self) -> BTreeSet<StreamId> {
        self.write_set.iter().map(|m| m.stream).collect()
    }

    /// Buffered writes on one stream, in write order.
    pub fn pending_for<'a>(&'a self, stream: &'a StreamId) -> impl Iterator<Item = &'a Mutation> {
        self.write_set.iter().filter(move |m| &m.stream == stream)
    }

    /// Drop buffered writes and move to a terminal state.
    pub fn resolve(&mut self, state: TransactionState) {
        if state == TransactionState::Aborted {
            self.write_set.clear();
        }
        self.state = state;
    }
}
