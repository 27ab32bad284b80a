//! Metrics registry.
//!
//! Metric namespaces:
//! - tessera.sequencer.*
//! - tessera.txn.*
//! - tessera.recovery.*
//! - tessera.detector.*
//! - tessera.log.* / tessera.layout.*

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metric names.
pub mod metrics {
    /// Tokens issued by the sequencer.
    pub const SEQUENCER_TOKENS_ISSUED: &str = "tessera.sequencer.tokens_issued";
    /// Sequencer operations refused because the epoch moved on.
    pub const SEQUENCER_STALE_REJECTIONS: &str = "tessera.sequencer.stale_rejections";
    /// Conditional tokens refused by transaction resolution.
    pub const SEQUENCER_RESOLUTION_ABORTS: &str = "tessera.sequencer.resolution_aborts";
    /// Committed transactions.
    pub const TXN_COMMITS: &str = "tessera.txn.commits";
    /// Aborted transactions.
    pub const TXN_ABORTS: &str = "tessera.txn.aborts";
    /// Layout recovery attempts.
    pub const RECOVERY_ATTEMPTS: &str = "tessera.recovery.attempts";
    /// Polling rounds completed.
    pub const DETECTOR_ROUNDS: &str = "tessera.detector.rounds";
    /// Sequencer-observed global tail.
    pub const LOG_GLOBAL_TAIL: &str = "tessera.log.global_tail";
    /// Layout epoch installed locally.
    pub const LAYOUT_EPOCH: &str = "tessera.layout.epoch";
}

type Family = RwLock<BTreeMap<String, AtomicU64>>;

/// Counters and gauges, keyed by metric name.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Family,
    gauges: Family,
}

/// Apply `op` to the named slot, creating it at zero on first use.
fn with_slot(family: &Family, name: &str, op: impl Fn(&AtomicU64)) {
    if let Some(slot) = family.read().get(name) {
        op(slot);
        return;
    }
    op(family.write().entry(name.to_owned()).or_default());
}

fn load(family: &Family, name: &str) -> u64 {
    family
        .read()
        .get(name)
        .map_or(0, |slot| slot.load(Ordering::Relaxed))
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Add `value` to a monotonically increasing counter.
    pub fn counter_add(&self, name: &str, value: u64) {
        with_slot(&self.counters, name, |c| {
            c.fetch_add(value, Ordering::Relaxed);
        });
    }

    /// Current counter value; zero if never incremented.
    pub fn counter_get(&self, name: &str) -> u64 {
        load(&self.counters, name)
    }

    /// Overwrite a gauge.
    pub fn gauge_set(&self, name: &str, value: u64) {
        with_slot(&self.gauges, name, |g| g.store(value, Ordering::Relaxed));
    }

    pub fn gauge_get(&self, name: &str) -> u64 {
        load(&self.gauges, name)
    }

    /// Prometheus text exposition, counters first, each family sorted by name.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        for (kind, family) in [("counter", &self.counters), ("gauge", &self.gauges)] {
            for (name, slot) in family.read().iter() {
                let name = name.replace('.', "_");
                out.push_str(&format!(
                    "# TYPE {name} {kind}\n{name} {}\n",
                    slot.load(Ordering::Relaxed)
                ));
            }
        }
        out
    }
}
