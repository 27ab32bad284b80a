//! Epoch-fenced layout recovery.
//!
//! A node coming back with a persisted layout at epoch `e` proposes the
//! same layout at `e + 1`. It is done when its own proposal wins or when
//! the cluster is already past `e`; either way it adopts and persists the
//! layout the cluster has accepted. A node never proposes anything but
//! `local + 1`, so it cannot drag the cluster backward.
//!
//! [`decide`] is the pure decision step. [`RecoveryCoordinator`] is the
//! driver that talks to the collaborators, logs, and sleeps between
//! attempts.

use crate::control::consensus::{LayoutConsensus, LayoutView};
use crate::control::epoch::EpochFence;
use crate::control::layout::Layout;
use crate::control::store::LayoutStore;
use crate::core::error::{TesseraError, TesseraResult};
use crate::core::time::{RetryInterval, Sleeper};
use crate::ops::observability::{metrics, MetricsRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why an attempt did not recover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// Our proposal lost and the cluster is not past our epoch.
    NotAhead { local_epoch: u64, cluster_epoch: u64 },
    /// The accepted layout could not be fetched.
    ClusterUnavailable { message: String },
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::NotAhead {
                local_epoch,
                cluster_epoch,
            } => write!(
                f,
                "cluster epoch {cluster_epoch} is not past local epoch {local_epoch}"
            ),
            RetryReason::ClusterUnavailable { message } => {
                write!(f, "cluster layout unavailable: {message}")
            }
        }
    }
}

/// Outcome of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Adopt `layout`. `won_proposal` is true if our proposal was accepted.
    Recovered { layout: Layout, won_proposal: bool },
    /// Sleep and try again from the latest local layout.
    Retry(RetryReason),
}

/// Decide the outcome of an attempt from its inputs.
pub fn decide(
    local_epoch: u64,
    reconfigured: bool,
    cluster: Result<&Layout, &TesseraError>,
) -> RecoveryStep {
    match cluster {
        Err(err) => RecoveryStep::Retry(RetryReason::ClusterUnavailable {
            message: err.to_string(),
        }),
        Ok(cluster) if reconfigured || cluster.epoch > local_epoch => RecoveryStep::Recovered {
            layout: cluster.clone(),
            won_proposal: reconfigured,
        },
        Ok(cluster) => RecoveryStep::Retry(RetryReason::NotAhead {
            local_epoch,
            cluster_epoch: cluster.epoch,
        }),
    }
}

/// What a finished recovery loop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub layout: Layout,
    pub won_proposal: bool,
    /// Attempts made, including the successful one.
    pub attempts: u64,
}

/// Drives recovery attempts against the cluster until one succeeds.
pub struct RecoveryCoordinator {
    store: Arc<dyn LayoutStore>,
    consensus: Arc<dyn LayoutConsensus>,
    view: Arc<dyn LayoutView>,
    sleeper: Arc<dyn Sleeper>,
    interval: RetryInterval,
    fence: Option<Arc<EpochFence>>,
    metrics: Option<Arc<MetricsRegistry>>,
    stopped: Arc<AtomicBool>,
}

impl RecoveryCoordinator {
    pub fn new(
        store: Arc<dyn LayoutStore>,
        consensus: Arc<dyn LayoutConsensus>,
        view: Arc<dyn LayoutView>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            store,
            consensus,
            view,
            sleeper,
            interval: RetryInterval::default(),
            fence: None,
            metrics: None,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the backoff between attempts.
    pub fn with_interval(mut self, interval: RetryInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Advance this fence to the recovered epoch.
    pub fn with_fence(mut self, fence: Arc<EpochFence>) -> Self {
        self.fence = Some(fence);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle that stops the loop before its next attempt.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    fn local_layout(&self) -> TesseraResult<Layout> {
        self.store.load()?.ok_or_else(|| TesseraError::Storage {
            message: "no persisted layout to recover from".to_string(),
        })
    }

    /// Run one attempt. Only storage failures are returned as errors.
    pub fn run_recovery_attempt(&self) -> TesseraResult<RecoveryStep> {
        let local = self.local_layout()?;
        let proposal = local.next_epoch();

        let reconfigured = match self.consensus.propose(&proposal) {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(epoch = proposal.epoch, error = %err, "layout proposal failed");
                false
            }
        };

        self.view.invalidate();
        let cluster = self.view.layout();
        let step = decide(local.epoch, reconfigured, cluster.as_ref());

        if let RecoveryStep::Recovered { layout, .. } = &step {
            self.store.save(layout)?;
            if let Some(fence) = &self.fence {
                fence.advance_to(layout.epoch);
            }
            if let Some(m) = &self.metrics {
                m.gauge_set(metrics::LAYOUT_EPOCH, layout.epoch);
            }
        }
        Ok(step)
    }

    /// Retry until an attempt recovers.
    ///
    /// There is no attempt limit. Returns `Ok(None)` only when stopped
    /// through [`Self::stop_handle`].
    pub fn retry_until_recovery(&self) -> TesseraResult<Option<RecoveryReport>> {
        let mut attempts: u64 = 0;
        loop {
            if self.stopped.load(Ordering::Acquire) {
                tracing::info!(attempts, "layout recovery stopped");
                return Ok(None);
            }

            attempts += 1;
            if let Some(m) = &self.metrics {
                m.counter_inc(metrics::RECOVERY_ATTEMPTS);
            }

            match self.run_recovery_attempt()? {
                RecoveryStep::Recovered {
                    layout,
                    won_proposal,
                } => {
                    tracing::info!(
                        epoch = layout.epoch,
                        won_proposal,
                        attempts,
                        "layout recovery succeeded"
                    );
                    return Ok(Some(RecoveryReport {
                        layout,
                        won_proposal,
                        attempts,
                    }));
                }
                RecoveryStep::Retry(reason) => {
                    tracing::error!(
                        attempt = attempts,
                        retry_interval = %self.interval,
                        reason = %reason,
                        "layout recovery failed, retrying"
                    );
                    self.sleeper.sleep(self.interval.as_duration());
                }
            }
        }
    }
}
