//! Node runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: layout (recover or bootstrap) → sequencer → failure detector
//! - Shutdown order: failure detector → recovery loop → sequencer
//!
//! The standalone node hosts the layout acceptors and its log unit
//! in-process. Layout recovery runs on a blocking task because it sleeps
//! between attempts.

use crate::control::consensus::{CachedLayoutView, InMemoryLayoutConsensus, LayoutView};
use crate::control::detector::{FailureDetector, PollReport};
use crate::control::epoch::EpochFence;
use crate::control::layout::{Layout, INVALID_EPOCH};
use crate::control::recovery::RecoveryCoordinator;
use crate::control::store::{FileLayoutStore, LayoutStore};
use crate::core::config::Config;
use crate::core::time::ThreadSleeper;
use crate::log::unit::{InMemoryLogUnit, LogUnit};
use crate::ops::observability::{metrics, MetricsRegistry};
use crate::protocol::service::{LoopbackProber, SequencerService};
use crate::sequencer::server::{Sequencer, SequencerRouter};
use crate::txn::manager::TransactionManager;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Poll reports buffered for the consumer. Later rounds are dropped while it is full.
const POLL_REPORT_CAPACITY: usize = 16;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    pub layout: ComponentHealth,
    pub sequencer: ComponentHealth,
    pub detector: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            layout: ComponentHealth::Starting,
            sequencer: ComponentHealth::Starting,
            detector: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the node can serve requests.
    pub fn is_ready(&self) -> bool {
        self.layout == ComponentHealth::Healthy && self.sequencer == ComponentHealth::Healthy
    }

    /// Check if the node is alive (no component failed).
    pub fn is_alive(&self) -> bool {
        ![self.layout, self.sequencer, self.detector].contains(&ComponentHealth::Failed)
    }
}

/// Tessera node runtime holding all component handles.
pub struct NodeRuntime {
    config: Arc<Config>,
    health: RuntimeHealth,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<MetricsRegistry>,
    fence: Arc<EpochFence>,
    log: Arc<InMemoryLogUnit>,
    store: Arc<dyn LayoutStore>,
    layout: Option<Layout>,
    consensus: Option<Arc<InMemoryLayoutConsensus>>,
    recovery_stop: Option<Arc<AtomicBool>>,
    sequencer: Option<Arc<SequencerRouter>>,
    service: Option<Arc<SequencerService>>,
    reports_rx: Option<mpsc::Receiver<PollReport>>,
    detector_handle: Option<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let store = Arc::new(FileLayoutStore::new(config.paths.layout_file.clone()));
        Ok(Self::with_store(config, store))
    }

    /// Create a runtime persisting its layout in `store`.
    pub fn with_store(config: Config, store: Arc<dyn LayoutStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config: Arc::new(config),
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            metrics: Arc::new(MetricsRegistry::new()),
            fence: Arc::new(EpochFence::new(INVALID_EPOCH)),
            log: Arc::new(InMemoryLogUnit::new()),
            store,
            layout: None,
            consensus: None,
            recovery_stop: None,
            sequencer: None,
            service: None,
            reports_rx: None,
            detector_handle: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Layout this node is operating under, once started.
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Current epoch of the node's fence.
    pub fn epoch(&self) -> u64 {
        self.fence.current()
    }

    /// Request handler, once started.
    pub fn service(&self) -> Option<Arc<SequencerService>> {
        self.service.clone()
    }

    /// A transaction manager bound to this node's sequencer and log.
    pub fn transactions(&self) -> Option<TransactionManager> {
        let sequencer = self.sequencer.clone()?;
        Some(TransactionManager::with_metrics(
            sequencer,
            self.log.clone(),
            self.config.transactions.conflict_granularity,
            self.metrics.clone(),
        ))
    }

    /// Take the receiving end of the poll report channel.
    pub fn take_poll_reports(&mut self) -> Option<mpsc::Receiver<PollReport>> {
        self.reports_rx.take()
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            node = %self.config.node_id(),
            layout_file = %self.config.paths.layout_file.display(),
            "starting Tessera node"
        );

        self.init_layout().await?;
        self.init_sequencer()?;
        self.start_detector()?;

        self.running.store(true, Ordering::Release);
        tracing::info!(epoch = self.fence.current(), "Tessera node started");
        Ok(())
    }

    /// Recover from the persisted layout, or bootstrap one from config.
    async fn init_layout(&mut self) -> Result<()> {
        let persisted = self.store.load().context("failed to load persisted layout")?;

        let layout = match persisted {
            Some(persisted) => {
                tracing::info!(epoch = persisted.epoch, "recovering from persisted layout");
                let consensus = Arc::new(InMemoryLayoutConsensus::new(&persisted));
                self.consensus = Some(consensus.clone());
                self.recover(consensus).await?
            }
            None => {
                let layout = self.config.bootstrap_layout();
                layout.validate().context("bootstrap layout is invalid")?;
                self.store
                    .save(&layout)
                    .context("failed to persist bootstrap layout")?;
                self.consensus = Some(Arc::new(InMemoryLayoutConsensus::new(&layout)));
                tracing::info!(
                    epoch = layout.epoch,
                    members = layout.layout_servers.len(),
                    "bootstrapped new layout"
                );
                layout
            }
        };

        self.fence.advance_to(layout.epoch);
        self.metrics.gauge_set(metrics::LAYOUT_EPOCH, layout.epoch);
        self.layout = Some(layout);
        self.health.layout = ComponentHealth::Healthy;
        Ok(())
    }

    async fn recover(&mut self, consensus: Arc<InMemoryLayoutConsensus>) -> Result<Layout> {
        let view: Arc<dyn LayoutView> = Arc::new(CachedLayoutView::new(consensus.clone()));
        let coordinator = RecoveryCoordinator::new(
            self.store.clone(),
            consensus,
            view,
            Arc::new(ThreadSleeper),
        )
        .with_interval(self.config.management.recovery_retry_interval())
        .with_fence(self.fence.clone())
        .with_metrics(self.metrics.clone());
        self.recovery_stop = Some(coordinator.stop_handle());

        let report = tokio::task::spawn_blocking(move || coordinator.retry_until_recovery())
            .await
            .context("layout recovery task panicked")?
            .context("layout recovery failed")?;

        match report {
            Some(report) => Ok(report.layout),
            None => anyhow::bail!("layout recovery stopped before completing"),
        }
    }

    /// Seal the log at the layout epoch and bootstrap the sequencer from it.
    fn init_sequencer(&mut self) -> Result<()> {
        let epoch = self.fence.current();
        self.log.seal(epoch).context("failed to seal log unit")?;
        let sequencer = Sequencer::bootstrap(epoch, self.fence.clone(), self.log.as_ref())
            .context("failed to bootstrap sequencer")?
            .with_metrics(self.metrics.clone());
        let router = Arc::new(SequencerRouter::new(Arc::new(sequencer)));

        let consensus = self
            .consensus
            .clone()
            .context("layout consensus not initialized")?;
        let view: Arc<dyn LayoutView> = Arc::new(CachedLayoutView::new(consensus.clone()));
        self.service = Some(Arc::new(SequencerService::new(
            self.fence.clone(),
            router.clone(),
            self.log.clone(),
            consensus,
            view,
        )));
        self.sequencer = Some(router);
        self.health.sequencer = ComponentHealth::Healthy;
        Ok(())
    }

    /// Spawn the periodic failure-detector loop.
    fn start_detector(&mut self) -> Result<()> {
        let layout = self.layout.clone().context("layout not initialized")?;
        let service = self.service.clone().context("service not initialized")?;
        let prober = LoopbackProber::new(self.config.node_id(), service);
        let mut detector = FailureDetector::new(self.config.management.ping_retries);
        let interval = self.config.management.poll_interval();
        let registry = self.metrics.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let (tx, rx) = mpsc::channel(POLL_REPORT_CAPACITY);
        self.reports_rx = Some(rx);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = detector.poll(&layout, &prober);
                        registry.counter_inc(metrics::DETECTOR_ROUNDS);
                        match tx.try_send(report) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(report)) => {
                                tracing::debug!(
                                    epoch = report.poll_epoch,
                                    "poll report buffer full, dropping report"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                tracing::trace!("poll report receiver dropped");
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(rounds = detector.rounds(), "failure detector stopped");
        });

        self.detector_handle = Some(handle);
        self.health.detector = ComponentHealth::Healthy;
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
        if let Some(stop) = &self.recovery_stop {
            stop.store(true, Ordering::Release);
        }
    }

    /// Run the node until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping Tessera node");
        self.running.store(false, Ordering::Release);
        self.shutdown();

        self.health.detector = ComponentHealth::Stopping;
        if let Some(handle) = self.detector_handle.take() {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "failure detector task panicked"),
                Err(_) => tracing::warn!("failure detector stop timed out"),
            }
        }
        self.health.detector = ComponentHealth::Stopped;

        self.health.sequencer = ComponentHealth::Stopped;
        self.health.layout = ComponentHealth::Stopped;
        tracing::info!("Tessera node stopped");
        Ok(())
    }
}
