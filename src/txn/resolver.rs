//! Commit-time conflict resolution.
//!
//! For every stream a transaction read, the current tail is compared with
//! the tail recorded at first touch. An unchanged tail is never a
//! conflict. With stream granularity any advance is one. With key
//! granularity the entries in `(snapshot, current]` are walked through
//! backpointers and only those intersecting the read footprint count. A
//! window that cannot be walked in full, or that crosses an unwritten or
//! hole-filled address, aborts as unreadable history.

use crate::core::error::{AbortCause, TesseraError, TesseraResult};
use crate::log::address::Address;
use crate::log::stream::StreamId;
use crate::log::unit::LogUnit;
use crate::sequencer::server::SequencerClient;
use crate::txn::context::{ConflictGranularity, ReadFootprint, TxnContext};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validates a transaction's read set against the current log.
#[derive(Clone)]
pub struct ConflictResolver {
    sequencer: Arc<dyn SequencerClient>,
    log: Arc<dyn LogUnit>,
    granularity: ConflictGranularity,
}

impl ConflictResolver {
    pub fn new(
        sequencer: Arc<dyn SequencerClient>,
        log: Arc<dyn LogUnit>,
        granularity: ConflictGranularity,
    ) -> Self {
        Self {
            sequencer,
            log,
            granularity,
        }
    }

    pub fn granularity(&self) -> ConflictGranularity {
        self.granularity
    }

    /// Validate every read stream.
    ///
    /// Returns, per read stream, the address it was validated through.
    /// The sequencer re-checks these when issuing the commit address.
    pub fn validate(&self, ctx: &TxnContext) -> TesseraResult<BTreeMap<StreamId, Address>> {
        let mut validated = BTreeMap::new();
        for (stream, footprint) in ctx.read_set() {
            let snapshot = ctx.snapshot(stream).unwrap_or(Address::NON_ADDRESS);
            let through = self.validate_stream(stream, footprint, snapshot)?;
            validated.insert(*stream, through);
        }
        Ok(validated)
    }

    fn validate_stream(
        &self,
        stream: &StreamId,
        footprint: &ReadFootprint,
        snapshot: Address,
    ) -> TesseraResult<Address> {
        let current = self.sequencer.query_stream_tail(stream)?;
        if current <= snapshot {
            return Ok(snapshot);
        }
        let conflict =
            |cause| Err(TesseraError::aborted(*stream, snapshot, current, cause));

        if self.granularity == ConflictGranularity::Stream {
            return conflict(AbortCause::Conflict);
        }

        let window = self
            .sequencer
            .walk_backpointers(stream, snapshot.next(), current)?;
        if !window.complete || window.addresses.is_empty() {
            return conflict(AbortCause::UnreadableHistory);
        }

        for address in window.addresses {
            let entry = match self.log.read(address)? {
                Some(entry) if !entry.is_hole() => entry,
                _ => return conflict(AbortCause::UnreadableHistory),
            };
            let mut mutations = entry.mutations_for(stream).peekable();
            if mutations.peek().is_none() {
                // Entry on the stream without a payload for it.
                return conflict(AbortCause::Conflict);
            }
            if mutations.any(|m| footprint.intersects(m)) {
                return conflict(AbortCause::Conflict);
            }
        }
        Ok(current)
    }
}
