//! Epoch-fenced sequencer.
//!
//! The sequencer is the single serialization point of the log: every new
//! address is handed out under one mutex, so concurrent token requests
//! never receive overlapping ranges. Its state (tails and backpointer
//! chains) is soft. A sequencer taking over a new epoch rebuilds it by
//! replaying the log before serving, which is what guarantees that its
//! first address is above everything issued in earlier epochs.

use crate::control::epoch::EpochFence;
use crate::core::error::{TesseraError, TesseraResult};
use crate::log::address::{Address, AddressRange};
use crate::log::stream::StreamId;
use crate::log::tail::{StreamTailTracker, TailState};
use crate::log::unit::LogUnit;
use crate::ops::observability::{metrics, MetricsRegistry};
use crate::sequencer::token::{
    BackpointerWalk, Token, TokenRequest, TokenResponse, MAX_TOKEN_ADDRESSES,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Sequencer operations used by clients and the transaction layer.
pub trait SequencerClient: Send + Sync {
    /// Epoch the serving sequencer was bootstrapped for.
    fn epoch(&self) -> u64;

    /// Reserve a contiguous range of new addresses.
    fn request_token(&self, request: &TokenRequest) -> TesseraResult<TokenResponse>;

    /// Current tail of a stream, without allocating.
    fn query_stream_tail(&self, stream: &StreamId) -> TesseraResult<Address>;

    /// Walk a stream's chain down to `start`, keeping addresses up to `end`.
    fn walk_backpointers(
        &self,
        stream: &StreamId,
        start: Address,
        end: Address,
    ) -> TesseraResult<BackpointerWalk>;

    /// Addresses of a stream within `[start, end]`, newest first.
    fn query_backpointers(
        &self,
        stream: &StreamId,
        start: Address,
        end: Address,
    ) -> TesseraResult<Vec<Address>> {
        Ok(self.walk_backpointers(stream, start, end)?.addresses)
    }
}

#[derive(Debug, Default)]
struct SequencerState {
    tails: StreamTailTracker,
    /// Per stream: address -> previous address on the same stream.
    chains: HashMap<StreamId, BTreeMap<Address, Address>>,
    trim_mark: Address,
}

impl SequencerState {
    fn link(&mut self, stream: StreamId, address: Address, prev: Address) {
        self.chains.entry(stream).or_default().insert(address, prev);
    }
}

/// The authoritative sequencer for one epoch.
pub struct Sequencer {
    epoch: u64,
    fence: Arc<EpochFence>,
    state: Mutex<SequencerState>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Sequencer {
    /// A sequencer for an empty log.
    pub fn new(epoch: u64, fence: Arc<EpochFence>) -> Self {
        Self::from_tails(epoch, fence, TailState::default())
    }

    /// A sequencer seeded from a copy of tail state, such as a checkpoint.
    ///
    /// Backpointer chains start empty; queries only see addresses issued
    /// after this point.
    pub fn from_tails(epoch: u64, fence: Arc<EpochFence>, tails: TailState) -> Self {
        Self {
            epoch,
            fence,
            state: Mutex::new(SequencerState {
                tails: StreamTailTracker::from_state(tails),
                chains: HashMap::new(),
                trim_mark: Address::NON_ADDRESS,
            }),
            metrics: None,
        }
    }

    /// Rebuild a sequencer for `epoch` by replaying the log.
    ///
    /// Replay is complete and in address order, so each stream entry links
    /// to the previous entry seen on that stream. Recorded backpointers are
    /// not trusted here: they may name an address that was later hole-filled.
    pub fn bootstrap(epoch: u64, fence: Arc<EpochFence>, log: &dyn LogUnit) -> TesseraResult<Self> {
        let entries = log.replay()?;
        let mut state = SequencerState::default();

        let mut last_seen: HashMap<StreamId, Address> = HashMap::new();
        for entry in &entries {
            state.tails.update(entry);
            for stream in &entry.streams {
                let prev = last_seen.get(stream).copied().unwrap_or(Address::NON_ADDRESS);
                state.link(*stream, entry.address, prev);
                last_seen.insert(*stream, entry.address);
            }
        }

        tracing::info!(
            epoch,
            global_tail = state.tails.global_tail().get(),
            streams = state.tails.stream_count(),
            replayed = entries.len(),
            "sequencer bootstrapped from log"
        );

        Ok(Self {
            epoch,
            fence,
            state: Mutex::new(state),
            metrics: None,
        })
    }

    /// Report counters and gauges to a registry.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn check_epoch(&self) -> TesseraResult<()> {
        let layout_epoch = self.fence.current();
        if layout_epoch != self.epoch {
            if let Some(m) = &self.metrics {
                m.counter_inc(metrics::SEQUENCER_STALE_REJECTIONS);
            }
            tracing::warn!(
                sequencer_epoch = self.epoch,
                layout_epoch,
                "rejecting request on stale sequencer"
            );
            return Err(TesseraError::stale_sequencer(self.epoch, layout_epoch));
        }
        Ok(())
    }

    /// Copy of the current tails.
    pub fn tail_state(&self) -> TesseraResult<TailState> {
        self.check_epoch()?;
        Ok(self.state.lock().tails.snapshot())
    }

    /// Highest address handed out so far.
    pub fn query_global_tail(&self) -> TesseraResult<Address> {
        self.check_epoch()?;
        Ok(self.state.lock().tails.global_tail())
    }

    /// Drop backpointer links below `address`.
    ///
    /// Tails are untouched; only history walks are bounded by the mark.
    pub fn trim(&self, address: Address) -> TesseraResult<()> {
        self.check_epoch()?;
        let mut state = self.state.lock();
        if address <= state.trim_mark {
            return Ok(());
        }
        state.trim_mark = address;
        for chain in state.chains.values_mut() {
            *chain = chain.split_off(&address);
        }
        tracing::debug!(trim_mark = address.get(), "sequencer trimmed backpointers");
        Ok(())
    }
}

impl SequencerClient for Sequencer {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn request_token(&self, request: &TokenRequest) -> TesseraResult<TokenResponse> {
        self.check_epoch()?;
        if request.num_addresses == 0 {
            return Err(TesseraError::invalid("token request must reserve at least one address"));
        }
        if request.num_addresses > MAX_TOKEN_ADDRESSES {
            return Err(TesseraError::invalid(format!(
                "token request for {} addresses exceeds the limit of {}",
                request.num_addresses, MAX_TOKEN_ADDRESSES
            )));
        }

        let mut state = self.state.lock();

        if let Some(resolution) = &request.txn_resolution {
            for (stream, validated) in &resolution.read_set {
                let tail = state.tails.stream_tail(stream);
                if tail > *validated {
                    if let Some(m) = &self.metrics {
                        m.counter_inc(metrics::SEQUENCER_RESOLUTION_ABORTS);
                    }
                    return Ok(TokenResponse::Aborted {
                        stream: *stream,
                        validated: *validated,
                        tail,
                    });
                }
            }
        }

        let first = state
            .tails
            .global_tail()
            .checked_offset(1)
            .ok_or_else(|| TesseraError::invalid("address space exhausted"))?;
        let range = AddressRange::starting_at(first, request.num_addresses)?;

        let mut backpointers = BTreeMap::new();
        for stream in &request.streams {
            let prev = state.tails.advance_stream(*stream, range.end);
            backpointers.insert(*stream, prev);
            let mut link = prev;
            for address in range.iter() {
                state.link(*stream, address, link);
                link = address;
            }
        }
        state.tails.update_global_tail(range.end);

        if let Some(m) = &self.metrics {
            m.counter_add(metrics::SEQUENCER_TOKENS_ISSUED, request.num_addresses);
            m.gauge_set(metrics::LOG_GLOBAL_TAIL, range.end.get() as u64);
        }

        Ok(TokenResponse::Issued(Token {
            epoch: self.epoch,
            range,
            backpointers,
        }))
    }

    fn query_stream_tail(&self, stream: &StreamId) -> TesseraResult<Address> {
        self.check_epoch()?;
        Ok(self.state.lock().tails.stream_tail(stream))
    }

    fn walk_backpointers(
        &self,
        stream: &StreamId,
        start: Address,
        end: Address,
    ) -> TesseraResult<BackpointerWalk> {
        self.check_epoch()?;
        let state = self.state.lock();
        let chain = state.chains.get(stream);

        let mut addresses = Vec::new();
        let mut current = state.tails.stream_tail(stream);
        let complete = loop {
            if !current.is_address() || current < start {
                break true;
            }
            if current < state.trim_mark {
                break false;
            }
            // Checkpoint-only tails have no link.
            let Some(prev) = chain.and_then(|c| c.get(&current)) else {
                break false;
            };
            if current <= end {
                addresses.push(current);
            }
            current = *prev;
        };
        Ok(BackpointerWalk {
            addresses,
            complete,
        })
    }
}

/// Routes client calls to whichever sequencer is currently installed.
///
/// When a call fails as stale and a newer sequencer has been installed in
/// the meantime, the call is retried once against the new one.
pub struct SequencerRouter {
    current: RwLock<Arc<Sequencer>>,
}

impl SequencerRouter {
    /// Create a router over an initial sequencer.
    pub fn new(sequencer: Arc<Sequencer>) -> Self {
        Self {
            current: RwLock::new(sequencer),
        }
    }

    /// Install a newly bootstrapped sequencer. Older epochs are ignored.
    pub fn install(&self, sequencer: Arc<Sequencer>) -> bool {
        let mut current = self.current.write();
        if sequencer.epoch() <= current.epoch() {
            return false;
        }
        tracing::info!(
            old_epoch = current.epoch(),
            new_epoch = sequencer.epoch(),
            "sequencer installed"
        );
        *current = sequencer;
        true
    }

    /// The sequencer currently receiving calls.
    pub fn current(&self) -> Arc<Sequencer> {
        self.current.read().clone()
    }

    fn call<T>(&self, op: impl Fn(&Sequencer) -> TesseraResult<T>) -> TesseraResult<T> {
        let sequencer = self.current();
        match op(sequencer.as_ref()) {
            Err(err @ TesseraError::StaleSequencer { .. }) => {
                let latest = self.current();
                if latest.epoch() > sequencer.epoch() {
                    op(latest.as_ref())
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }
}

impl SequencerClient for SequencerRouter {
    fn epoch(&self) -> u64 {
        self.current().epoch()
    }

    fn request_token(&self, request: &TokenRequest) -> TesseraResult<TokenResponse> {
        self.call(|s| s.request_token(request))
    }

    fn query_stream_tail(&self, stream: &StreamId) -> TesseraResult<Address> {
        self.call(|s| s.query_stream_tail(stream))
    }

    fn walk_backpointers(
        &self,
        stream: &StreamId,
        start: Address,
        end: Address,
    ) -> TesseraResult<BackpointerWalk> {
        self.call(|s| s.walk_backpointers(stream, start, end))
    }
}

/// Seal the log at `new_epoch`, advance the fence, and bootstrap the
/// sequencer that will serve the new epoch.
///
/// The old sequencer starts failing with `StaleSequencer` as soon as the
/// fence moves, and writers still holding old-epoch tokens are refused by
/// the sealed log unit.
pub fn failover(
    fence: Arc<EpochFence>,
    log: &dyn LogUnit,
    new_epoch: u64,
) -> TesseraResult<Sequencer> {
    if new_epoch <= fence.current() {
        return Err(TesseraError::wrong_epoch(fence.current() + 1, new_epoch));
    }
    log.seal(new_epoch)?;
    fence.advance_to(new_epoch);
    Sequencer::bootstrap(new_epoch, fence, log)
}
