//! Layout consensus primitive and the cluster view of the layout.
//!
//! The core treats consensus as one atomic operation: propose a layout at
//! epoch N; it is accepted iff no layout at epoch N or higher has already
//! been accepted (or promised) by a majority of layout servers.
//! [`InMemoryLayoutConsensus`] models that over an in-process acceptor set
//! whose members can be partitioned away.

use crate::control::layout::{Layout, NodeId, INVALID_EPOCH};
use crate::core::error::{TesseraError, TesseraResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cluster-wide layout proposal.
pub trait LayoutConsensus: Send + Sync {
    /// Propose `layout` at `layout.epoch`. Returns whether it was accepted.
    fn propose(&self, layout: &Layout) -> TesseraResult<bool>;
}

/// A (possibly cached) view of the layout the cluster has accepted.
pub trait LayoutView: Send + Sync {
    /// Drop any cached layout so the next fetch goes to the cluster.
    fn invalidate(&self);

    /// The layout currently accepted by the cluster.
    fn layout(&self) -> TesseraResult<Layout>;
}

#[derive(Debug, Clone)]
struct Acceptor {
    promised: u64,
    accepted: Option<Layout>,
    reachable: bool,
}

/// In-process acceptor set.
#[derive(Debug)]
pub struct InMemoryLayoutConsensus {
    acceptors: Mutex<BTreeMap<NodeId, Acceptor>>,
}

impl InMemoryLayoutConsensus {
    /// Acceptors for every layout server of `initial`, all holding `initial`.
    pub fn new(initial: &Layout) -> Self {
        let acceptors = initial
            .layout_servers
            .iter()
            .map(|node| {
                (
                    node.clone(),
                    Acceptor {
                        promised: initial.epoch,
                        accepted: Some(initial.clone()),
                        reachable: true,
                    },
                )
            })
            .collect();
        Self {
            acceptors: Mutex::new(acceptors),
        }
    }

    /// Acceptors that have never accepted anything.
    pub fn empty(nodes: &[NodeId]) -> Self {
        let acceptors = nodes
            .iter()
            .map(|node| {
                (
                    node.clone(),
                    Acceptor {
                        promised: INVALID_EPOCH,
                        accepted: None,
                        reachable: true,
                    },
                )
            })
            .collect();
        Self {
            acceptors: Mutex::new(acceptors),
        }
    }

    /// Partition an acceptor away, or heal it.
    pub fn set_reachable(&self, node: &str, reachable: bool) {
        if let Some(acceptor) = self.acceptors.lock().get_mut(node) {
            acceptor.reachable = reachable;
        }
    }

    /// Epoch of the layout each acceptor currently holds.
    pub fn accepted_epochs(&self) -> BTreeMap<NodeId, u64> {
        self.acceptors
            .lock()
            .iter()
            .map(|(node, a)| {
                (
                    node.clone(),
                    a.accepted.as_ref().map(|l| l.epoch).unwrap_or(INVALID_EPOCH),
                )
            })
            .collect()
    }

    fn quorum(total: usize) -> usize {
        total / 2 + 1
    }

    /// Highest layout accepted by a majority of reachable acceptors.
    pub fn committed(&self) -> TesseraResult<Layout> {
        let acceptors = self.acceptors.lock();
        let quorum = Self::quorum(acceptors.len());
        let reachable: Vec<&Acceptor> = acceptors.values().filter(|a| a.reachable).collect();
        if reachable.len() < quorum {
            return Err(TesseraError::NodeUnreachable {
                node: format!("layout quorum ({} of {} reachable)", reachable.len(), acceptors.len()),
            });
        }

        let mut votes: BTreeMap<u64, (usize, &Layout)> = BTreeMap::new();
        for layout in reachable.iter().filter_map(|a| a.accepted.as_ref()) {
            votes.entry(layout.epoch).or_insert((0, layout)).0 += 1;
        }
        // Newest majority-accepted layout, else the newest one any reachable
        // acceptor holds.
        votes
            .iter()
            .rev()
            .find(|(_, (count, _))| *count >= quorum)
            .or_else(|| votes.iter().next_back())
            .map(|(_, (_, layout))| (*layout).clone())
            .ok_or_else(|| TesseraError::Internal {
                message: "no layout accepted by the cluster".to_string(),
            })
    }
}

impl LayoutConsensus for InMemoryLayoutConsensus {
    fn propose(&self, layout: &Layout) -> TesseraResult<bool> {
        let mut acceptors = self.acceptors.lock();
        let quorum = Self::quorum(acceptors.len());
        let granting: Vec<NodeId> = acceptors
            .iter()
            .filter(|(_, a)| a.reachable && a.promised < layout.epoch)
            .map(|(node, _)| node.clone())
            .collect();

        if granting.len() < quorum {
            tracing::debug!(
                epoch = layout.epoch,
                granted = granting.len(),
                quorum,
                "layout proposal rejected"
            );
            return Ok(false);
        }

        for node in granting {
            if let Some(acceptor) = acceptors.get_mut(&node) {
                acceptor.promised = layout.epoch;
                acceptor.accepted = Some(layout.clone());
            }
        }
        tracing::info!(epoch = layout.epoch, "layout proposal accepted");
        Ok(true)
    }
}

impl LayoutView for InMemoryLayoutConsensus {
    fn invalidate(&self) {}

    fn layout(&self) -> TesseraResult<Layout> {
        self.committed()
    }
}

/// Caching layout view in front of another view.
pub struct CachedLayoutView {
    source: Arc<dyn LayoutView>,
    cached: RwLock<Option<Layout>>,
}

impl CachedLayoutView {
    /// Cache layouts fetched from `source`.
    pub fn new(source: Arc<dyn LayoutView>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// The cached layout without fetching.
    pub fn peek(&self) -> Option<Layout> {
        self.cached.read().clone()
    }
}

impl LayoutView for CachedLayoutView {
    fn invalidate(&self) {
        *self.cached.write() = None;
        self.source.invalidate();
    }

    fn layout(&self) -> TesseraResult<Layout> {
        if let Some(layout) = self.cached.read().as_ref() {
            return Ok(layout.clone());
        }
        let layout = self.source.layout()?;
        *self.cached.write() = Some(layout.clone());
        Ok(layout)
    }
}
