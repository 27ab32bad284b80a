//! Log entries as seen by the core.
//!
//! A single physical entry can belong to several streams at once. Its
//! global address is assigned exactly once, by the sequencer, before the
//! entry becomes durable.

use crate::log::address::Address;
use crate::log::stream::StreamId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What occupies an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular data written by a client.
    Data,
    /// Junk written to fill an address whose writer never showed up.
    Hole,
}

/// Checkpoint metadata: this entry summarizes `summarized_stream` as of
/// `start_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointDescriptor {
    pub summarized_stream: StreamId,
    pub start_address: Address,
}

/// One buffered write against a stream.
///
/// The optional key narrows the write's conflict footprint. A mutation
/// without a key conflicts with every reader of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub stream: StreamId,
    pub key: Option<Bytes>,
    pub payload: Bytes,
}

impl Mutation {
    /// A write touching the whole stream.
    pub fn new(stream: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            key: None,
            payload: payload.into(),
        }
    }

    /// A write scoped to one key of the stream.
    pub fn keyed(stream: StreamId, key: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            key: Some(key.into()),
            payload: payload.into(),
        }
    }
}

/// A log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Global address (assigned by the sequencer).
    pub address: Address,
    /// Epoch of the layout the writer held.
    pub epoch: u64,
    /// Data or hole.
    pub kind: EntryKind,
    /// Streams this entry belongs to.
    pub streams: BTreeSet<StreamId>,
    /// Previous address on each stream, as issued with the token.
    pub backpointers: BTreeMap<StreamId, Address>,
    /// Checkpoint metadata, if this entry is part of a checkpoint.
    pub checkpoint: Option<CheckpointDescriptor>,
    /// Payload mutations.
    pub mutations: Vec<Mutation>,
}

impl LogEntry {
    /// A data entry whose stream set is derived from its mutations.
    pub fn data(address: Address, mutations: Vec<Mutation>) -> Self {
        let streams = mutations.iter().map(|m| m.stream).collect();
        Self {
            address,
            epoch: 0,
            kind: EntryKind::Data,
            streams,
            backpointers: BTreeMap::new(),
            checkpoint: None,
            mutations,
        }
    }

    /// A payload-free data entry on the given streams.
    pub fn on_streams(address: Address, streams: impl IntoIterator<Item = StreamId>) -> Self {
        Self {
            address,
            epoch: 0,
            kind: EntryKind::Data,
            streams: streams.into_iter().collect(),
            backpointers: BTreeMap::new(),
            checkpoint: None,
            mutations: Vec::new(),
        }
    }

    /// A hole-fill entry. Holes belong to no stream.
    pub fn hole(address: Address) -> Self {
        Self {
            address,
            epoch: 0,
            kind: EntryKind::Hole,
            streams: BTreeSet::new(),
            backpointers: BTreeMap::new(),
            checkpoint: None,
            mutations: Vec::new(),
        }
    }

    /// A checkpoint entry summarizing `stream` from `start_address`.
    ///
    /// Checkpoint entries live on their own checkpoint stream, so they do
    /// not add to the summarized stream's regular stream set.
    pub fn checkpoint(
        address: Address,
        checkpoint_stream: StreamId,
        stream: StreamId,
        start_address: Address,
    ) -> Self {
        let mut entry = Self::on_streams(address, [checkpoint_stream]);
        entry.checkpoint = Some(CheckpointDescriptor {
            summarized_stream: stream,
            start_address,
        });
        entry
    }

    /// Stamp the writer's epoch.
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Attach backpointers issued with the token.
    pub fn with_backpointers(mut self, backpointers: BTreeMap<StreamId, Address>) -> Self {
        self.backpointers = backpointers;
        self
    }

    /// Check if this entry is a hole.
    pub fn is_hole(&self) -> bool {
        self.kind == EntryKind::Hole
    }

    /// Check if this entry carries checkpoint metadata.
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Check if this entry belongs to a stream.
    pub fn belongs_to(&self, stream: &StreamId) -> bool {
        self.streams.contains(stream)
    }

    /// Backpointer for a stream, or `NON_ADDRESS` when none was recorded.
    pub fn backpointer(&self, stream: &StreamId) -> Address {
        self.backpointers
            .get(stream)
            .copied()
            .unwrap_or(Address::NON_ADDRESS)
    }

    /// Mutations addressed to one stream, in write order.
    pub fn mutations_for<'a>(&'a self, stream: &'a StreamId) -> impl Iterator<Item = &'a Mutation> {
        self.mutations.iter().filter(move |m| &m.stream == stream)
    }
}
