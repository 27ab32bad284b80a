//! Cluster resize.
//!
//! Adding or removing a node is a layout change at the next epoch, agreed
//! through the same proposal primitive recovery uses. A resize computed
//! from a layout that is no longer the newest loses to whichever change
//! took the epoch first.

use crate::control::consensus::{LayoutConsensus, LayoutView};
use crate::control::epoch::EpochFence;
use crate::control::layout::Layout;
use crate::control::store::LayoutStore;
use crate::core::error::TesseraResult;
use crate::ops::observability::{metrics, MetricsRegistry};
use std::sync::Arc;

/// Proposes membership changes against the cluster's accepted layout.
pub struct MembershipManager {
    view: Arc<dyn LayoutView>,
    consensus: Arc<dyn LayoutConsensus>,
    store: Option<Arc<dyn LayoutStore>>,
    fence: Option<Arc<EpochFence>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl MembershipManager {
    pub fn new(view: Arc<dyn LayoutView>, consensus: Arc<dyn LayoutConsensus>) -> Self {
        Self {
            view,
            consensus,
            store: None,
            fence: None,
            metrics: None,
        }
    }

    /// Persist every accepted layout to `store`.
    pub fn with_store(mut self, store: Arc<dyn LayoutStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Advance this fence to every accepted epoch.
    pub fn with_fence(mut self, fence: Arc<EpochFence>) -> Self {
        self.fence = Some(fence);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add `node`. Returns the accepted layout, or `None` if another
    /// change took the next epoch first.
    pub fn add_node(&self, node: &str) -> TesseraResult<Option<Layout>> {
        let proposal = self.view.layout()?.add_node(node)?;
        self.commit(proposal, "node added")
    }

    /// Remove `node`. Returns the accepted layout, or `None` if another
    /// change took the next epoch first.
    pub fn remove_node(&self, node: &str) -> TesseraResult<Option<Layout>> {
        let proposal = self.view.layout()?.remove_node(node)?;
        self.commit(proposal, "node removed")
    }

    fn commit(&self, proposal: Layout, change: &'static str) -> TesseraResult<Option<Layout>> {
        let accepted = self.consensus.propose(&proposal)?;
        self.view.invalidate();
        if !accepted {
            tracing::info!(epoch = proposal.epoch, change, "resize lost the epoch to another proposal");
            return Ok(None);
        }

        if let Some(store) = &self.store {
            store.save(&proposal)?;
        }
        if let Some(fence) = &self.fence {
            fence.advance_to(proposal.epoch);
        }
        if let Some(m) = &self.metrics {
            m.gauge_set(metrics::LAYOUT_EPOCH, proposal.epoch);
        }
        tracing::info!(
            epoch = proposal.epoch,
            members = proposal.layout_servers.len(),
            change,
            "cluster resized"
        );
        Ok(Some(proposal))
    }
}
