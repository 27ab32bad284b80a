//! Global and per-stream tail tracking.
//!
//! Holes belong to no stream, so the global tail is tracked separately
//! from the stream tails and may run ahead of every one of them.
//!
//! The tracker is not synchronized. Its owner (the sequencer or a log
//! unit) serializes updates behind its own lock.

use crate::log::address::Address;
use crate::log::entry::LogEntry;
use crate::log::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time copy of tracked tails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailState {
    pub global_tail: Address,
    pub stream_tails: HashMap<StreamId, Address>,
}

impl TailState {
    /// Tail of one stream, `NON_ADDRESS` when unknown.
    pub fn stream_tail(&self, stream: &StreamId) -> Address {
        self.stream_tails
            .get(stream)
            .copied()
            .unwrap_or(Address::NON_ADDRESS)
    }
}

/// Maintains the global tail and per-stream tails from observed entries.
///
/// Every update is a max, so applying entries in any order, or applying
/// the same entry twice, converges to the same state.
#[derive(Debug, Clone, Default)]
pub struct StreamTailTracker {
    global_tail: Address,
    stream_tails: HashMap<StreamId, Address>,
}

impl StreamTailTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            global_tail: Address::NON_ADDRESS,
            stream_tails: HashMap::new(),
        }
    }

    /// Rebuild a tracker from a copied state.
    pub fn from_state(state: TailState) -> Self {
        Self {
            global_tail: state.global_tail,
            stream_tails: state.stream_tails,
        }
    }

    /// Apply a batch of entries in order.
    pub fn update_all<'a>(&mut self, entries: impl IntoIterator<Item = &'a LogEntry>) {
        for entry in entries {
            self.update(entry);
        }
    }

    /// Apply one entry.
    pub fn update(&mut self, entry: &LogEntry) {
        let address = entry.address;
        self.update_global_tail(address);
        for stream in &entry.streams {
            self.advance_stream(*stream, address);
        }

        // A stream whose only data lives in a checkpoint must not look empty.
        // Checkpoints of empty streams carry NON_ADDRESS and are skipped so
        // they do not register a present-but-empty tail.
        if let Some(checkpoint) = entry.checkpoint {
            if checkpoint.start_address.is_address() {
                self.advance_stream(checkpoint.summarized_stream, checkpoint.start_address);
            }
        }
    }

    /// Advance the global tail without touching stream tails.
    pub fn update_global_tail(&mut self, address: Address) {
        self.global_tail = self.global_tail.max_with(address);
    }

    /// Advance one stream's tail. Returns the previous tail.
    pub fn advance_stream(&mut self, stream: StreamId, address: Address) -> Address {
        let slot = self.stream_tails.entry(stream).or_insert(Address::NON_ADDRESS);
        let prev = *slot;
        *slot = prev.max_with(address);
        prev
    }

    /// Fold another state in, keeping the max of every tail.
    pub fn merge(&mut self, other: &TailState) {
        self.update_global_tail(other.global_tail);
        for (stream, tail) in &other.stream_tails {
            if tail.is_address() {
                self.advance_stream(*stream, *tail);
            }
        }
    }

    /// Highest address observed on the log.
    pub fn global_tail(&self) -> Address {
        self.global_tail
    }

    /// Tail of a stream.
    ///
    /// Returns `NON_ADDRESS` both for streams never referenced and for
    /// streams referenced only at the sentinel. Use [`Self::lookup`] to
    /// tell the two apart.
    pub fn stream_tail(&self, stream: &StreamId) -> Address {
        self.lookup(stream).unwrap_or(Address::NON_ADDRESS)
    }

    /// Tail of a stream, or `None` if the stream was never referenced.
    pub fn lookup(&self, stream: &StreamId) -> Option<Address> {
        self.stream_tails.get(stream).copied()
    }

    /// Check whether a stream has been referenced.
    pub fn is_known(&self, stream: &StreamId) -> bool {
        self.stream_tails.contains_key(stream)
    }

    /// All tracked stream tails.
    pub fn stream_tails(&self) -> &HashMap<StreamId, Address> {
        &self.stream_tails
    }

    /// Number of tracked streams.
    pub fn stream_count(&self) -> usize {
        self.stream_tails.len()
    }

    /// Copy the current tails.
    pub fn snapshot(&self) -> TailState {
        TailState {
            global_tail: self.global_tail,
            stream_tails: self.stream_tails.clone(),
        }
    }
}
