//! Optimistic transactions over the shared log.
//!
//! Reads replay a stream up to its first-touch snapshot and then layer the
//! transaction's own buffered writes on top. Nothing is visible to others
//! until commit, which appends every buffered write as one multi-stream
//! entry at a single address.
//!
//! A stream's tail can name an address whose token was issued but whose
//! write has not landed. Readers wait a bounded number of intervals for it
//! and then fill it with a hole, after which the late writer is refused.

use crate::core::error::{AbortCause, TesseraError, TesseraResult};
use crate::core::time::{Sleeper, ThreadSleeper};
use crate::log::address::Address;
use crate::log::entry::{LogEntry, Mutation};
use crate::log::stream::StreamId;
use crate::log::unit::LogUnit;
use crate::ops::observability::{metrics, MetricsRegistry};
use crate::sequencer::server::SequencerClient;
use crate::sequencer::token::{TokenRequest, TokenResponse, TxnResolution};
use crate::txn::context::{ConflictGranularity, TransactionState, TxnContext};
use crate::txn::resolver::ConflictResolver;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reads of an unwritten address retried before a hole is filled.
pub const DEFAULT_HOLE_FILL_ATTEMPTS: u32 = 3;

/// Wait between those reads.
pub const DEFAULT_HOLE_FILL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone)]
struct HoleFill {
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    attempts: u32,
}

#[derive(Clone)]
struct Shared {
    sequencer: Arc<dyn SequencerClient>,
    log: Arc<dyn LogUnit>,
    resolver: ConflictResolver,
    metrics: Option<Arc<MetricsRegistry>>,
    hole_fill: HoleFill,
}

impl Shared {
    /// Read an address a stream chain points at, filling a hole under a
    /// writer that never lands.
    fn read_settled(&self, stream: &StreamId, address: Address) -> TesseraResult<LogEntry> {
        for _ in 0..self.hole_fill.attempts {
            if let Some(entry) = self.log.read(address)? {
                return Ok(entry);
            }
            self.hole_fill.sleeper.sleep(self.hole_fill.interval);
        }
        if let Some(entry) = self.log.read(address)? {
            return Ok(entry);
        }

        let epoch = self.sequencer.epoch();
        match self.log.fill_hole(address, epoch) {
            // The writer landed between the last read and the fill.
            Ok(()) | Err(TesseraError::Overwrite { .. }) => {}
            Err(err) => return Err(err),
        }
        tracing::debug!(%stream, %address, epoch, "filled hole under stalled writer");
        self.log.read(address)?.ok_or_else(|| TesseraError::Storage {
            message: format!("stream {stream} points at unwritten address {address}"),
        })
    }
}

/// Hands out transactions bound to one sequencer and log unit.
pub struct TransactionManager {
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(
        sequencer: Arc<dyn SequencerClient>,
        log: Arc<dyn LogUnit>,
        granularity: ConflictGranularity,
    ) -> Self {
        Self::build(sequencer, log, granularity, None)
    }

    /// Same as [`Self::new`], reporting commits and aborts to `metrics`.
    pub fn with_metrics(
        sequencer: Arc<dyn SequencerClient>,
        log: Arc<dyn LogUnit>,
        granularity: ConflictGranularity,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self::build(sequencer, log, granularity, Some(metrics))
    }

    fn build(
        sequencer: Arc<dyn SequencerClient>,
        log: Arc<dyn LogUnit>,
        granularity: ConflictGranularity,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        let resolver = ConflictResolver::new(sequencer.clone(), log.clone(), granularity);
        Self {
            shared: Arc::new(Shared {
                sequencer,
                log,
                resolver,
                metrics,
                hole_fill: HoleFill {
                    sleeper: Arc::new(ThreadSleeper),
                    interval: DEFAULT_HOLE_FILL_INTERVAL,
                    attempts: DEFAULT_HOLE_FILL_ATTEMPTS,
                },
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wait `attempts` times `interval` on an unwritten address before
    /// filling it with a hole. Applies to transactions begun afterwards.
    pub fn with_hole_fill(self, sleeper: Arc<dyn Sleeper>, interval: Duration, attempts: u32) -> Self {
        let mut shared = Shared::clone(&self.shared);
        shared.hole_fill = HoleFill {
            sleeper,
            interval,
            attempts,
        };
        Self {
            shared: Arc::new(shared),
            next_id: self.next_id,
        }
    }

    /// Start a transaction. No snapshot is taken until a stream is touched.
    pub fn begin(&self) -> Transaction {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Transaction {
            shared: self.shared.clone(),
            ctx: TxnContext::new(id),
        }
    }

    pub fn granularity(&self) -> ConflictGranularity {
        self.shared.resolver.granularity()
    }
}

/// One optimistic transaction.
pub struct Transaction {
    shared: Arc<Shared>,
    ctx: TxnContext,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.ctx.id
    }

    pub fn state(&self) -> TransactionState {
        self.ctx.state
    }

    /// Check if the transaction still accepts reads and writes.
    pub fn is_active(&self) -> bool {
        self.ctx.state == TransactionState::Open
    }

    /// Snapshot recorded for a stream, if it has been touched.
    pub fn snapshot(&self, stream: &StreamId) -> Option<Address> {
        self.ctx.snapshot(stream)
    }

    fn ensure_open(&self) -> TesseraResult<()> {
        if self.ctx.state.is_terminal() {
            return Err(TesseraError::TransactionResolved {
                state: self.ctx.state.to_string(),
            });
        }
        Ok(())
    }

    fn touch(&mut self, stream: StreamId) -> TesseraResult<Address> {
        if let Some(snapshot) = self.ctx.snapshot(&stream) {
            return Ok(snapshot);
        }
        let tail = self.shared.sequencer.query_stream_tail(&stream)?;
        Ok(self.ctx.touch(stream, tail))
    }

    /// Committed mutations on `stream` up to `snapshot`, oldest first.
    fn replay(&self, stream: &StreamId, snapshot: Address) -> TesseraResult<Vec<Mutation>> {
        if !snapshot.is_address() {
            return Ok(Vec::new());
        }
        let mut addresses = self
            .shared
            .sequencer
            .query_backpointers(stream, Address::ZERO, snapshot)?;
        addresses.reverse();

        let mut mutations = Vec::new();
        for address in addresses {
            let entry = self.shared.read_settled(stream, address)?;
            mutations.extend(entry.mutations_for(stream).cloned());
        }
        Ok(mutations)
    }

    /// Every mutation visible on a stream: history up to the snapshot, then
    /// this transaction's own writes.
    pub fn read(&mut self, stream: StreamId) -> TesseraResult<Vec<Mutation>> {
        self.ensure_open()?;
        let snapshot = self.touch(stream)?;
        self.ctx.record_read(stream, None);

        let mut visible = self.replay(&stream, snapshot)?;
        visible.extend(self.ctx.pending_for(&stream).cloned());
        Ok(visible)
    }

    /// Latest payload written to `key` on a stream, as seen by this transaction.
    pub fn read_key(&mut self, stream: StreamId, key: impl Into<Bytes>) -> TesseraResult<Option<Bytes>> {
        self.ensure_open()?;
        let key = key.into();
        let snapshot = self.touch(stream)?;
        self.ctx.record_read(stream, Some(&key));

        let history = self.replay(&stream, snapshot)?;
        let latest = history
            .iter()
            .chain(self.ctx.pending_for(&stream))
            .filter(|m| m.key.as_ref() == Some(&key))
            .last()
            .map(|m| m.payload.clone());
        Ok(latest)
    }

    /// Buffer a write. It stays invisible to everyone else until commit.
    pub fn write(&mut self, mutation: Mutation) -> TesseraResult<()> {
        self.ensure_open()?;
        self.touch(mutation.stream)?;
        self.ctx.buffer(mutation);
        Ok(())
    }

    /// Abandon the transaction. Nothing was appended, so nothing is undone.
    pub fn abort(&mut self) -> TesseraResult<()> {
        self.ensure_open()?;
        self.ctx.resolve(TransactionState::Aborted);
        if let Some(m) = &self.shared.metrics {
            m.counter_inc(metrics::TXN_ABORTS);
        }
        Ok(())
    }

    fn fail(&mut self, err: TesseraError) -> TesseraError {
        if let TesseraError::TransactionAborted {
            stream,
            snapshot,
            observed,
            cause,
        } = &err
        {
            tracing::debug!(
                txn = self.ctx.id,
                %stream,
                %snapshot,
                %observed,
                %cause,
                "transaction aborted"
            );
            self.ctx.resolve(TransactionState::Aborted);
            if let Some(m) = &self.shared.metrics {
                m.counter_inc(metrics::TXN_ABORTS);
            }
        }
        err
    }

    /// Validate and commit.
    ///
    /// Returns the commit address, or `None` for a transaction with no
    /// writes. On conflict the transaction is aborted and its writes are
    /// discarded. Other errors leave it open so the commit can be retried.
    pub fn commit(&mut self) -> TesseraResult<Option<Address>> {
        self.ensure_open()?;

        let read_set = match self.shared.resolver.validate(&self.ctx) {
            Ok(read_set) => read_set,
            Err(err) => return Err(self.fail(err)),
        };

        if self.ctx.write_set().is_empty() {
            self.ctx.resolve(TransactionState::Committed);
            if let Some(m) = &self.shared.metrics {
                m.counter_inc(metrics::TXN_COMMITS);
            }
            return Ok(None);
        }

        let request = TokenRequest::single(self.ctx.write_streams())
            .with_resolution(TxnResolution { read_set });
        let token = match self.shared.sequencer.request_token(&request)? {
            TokenResponse::Issued(token) => token,
            TokenResponse::Aborted {
                stream,
                validated,
                tail,
            } => {
                let err = TesseraError::aborted(stream, validated, tail, AbortCause::SequencerRace);
                return Err(self.fail(err));
            }
        };

        let entry = LogEntry::data(token.address(), self.ctx.write_set().to_vec())
            .with_epoch(token.epoch)
            .with_backpointers(token.backpointers.clone());
        if let Err(err) = self.shared.log.write(entry) {
            // Readers must not wait on an address this commit will never fill.
            if let Err(fill) = self.shared.log.fill_hole(token.address(), token.epoch) {
                tracing::warn!(
                    txn = self.ctx.id,
                    address = %token.address(),
                    error = %fill,
                    "failed to fill hole after failed commit write"
                );
            }
            return Err(err);
        }

        self.ctx.resolve(TransactionState::Committed);
        if let Some(m) = &self.shared.metrics {
            m.counter_inc(metrics::TXN_COMMITS);
        }
        tracing::debug!(txn = self.ctx.id, address = %token.address(), "transaction committed");
        Ok(Some(token.address()))
    }
}
