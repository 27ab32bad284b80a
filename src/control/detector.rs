//! Failure detector.
//!
//! Each polling round probes every layout member and produces a
//! [`PollReport`]. The detector only observes. Deciding what to do about
//! a changed or out-of-phase node belongs to the management layer that
//! consumes the report.

use crate::control::layout::{Layout, NodeId, INVALID_EPOCH};
use crate::core::error::{TesseraError, TesseraResult};
use crate::log::address::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a node says about itself when probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReply {
    pub epoch: u64,
    pub global_tail: Address,
    pub sequencer_ready: bool,
}

/// Liveness probe for one node.
pub trait NodeProber: Send + Sync {
    /// Probe a node once.
    fn probe(&self, node: &str) -> TesseraResult<ProbeReply>;
}

/// Responsiveness classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reachability {
    Responsive,
    Unresponsive,
}

/// Per-node health record carried in a poll report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub reachability: Reachability,
    /// Epoch the node reported, `INVALID_EPOCH` if it never answered.
    pub epoch: u64,
    pub global_tail: Address,
    pub sequencer_ready: bool,
    /// Probes that failed before the node answered (or all of them).
    pub failed_probes: u32,
}

impl ClusterState {
    fn unresponsive(failed_probes: u32) -> Self {
        Self {
            reachability: Reachability::Unresponsive,
            epoch: INVALID_EPOCH,
            global_tail: Address::NON_ADDRESS,
            sequencer_ready: false,
            failed_probes,
        }
    }

    fn responsive(reply: ProbeReply, failed_probes: u32) -> Self {
        Self {
            reachability: Reachability::Responsive,
            epoch: reply.epoch,
            global_tail: reply.global_tail,
            sequencer_ready: reply.sequencer_ready,
            failed_probes,
        }
    }

    /// Check if the node answered this round.
    pub fn is_responsive(&self) -> bool {
        self.reachability == Reachability::Responsive
    }
}

/// Result of one polling round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Epoch the poller expected nodes to be at.
    pub poll_epoch: u64,
    /// Nodes whose reachability flipped since the previous round.
    pub changed_nodes: BTreeSet<NodeId>,
    /// Responsive nodes reporting an epoch other than `poll_epoch`.
    pub out_of_phase_epoch_nodes: BTreeMap<NodeId, u64>,
    pub cluster_state_map: BTreeMap<NodeId, ClusterState>,
}

impl Default for PollReport {
    fn default() -> Self {
        Self {
            poll_epoch: INVALID_EPOCH,
            changed_nodes: BTreeSet::new(),
            out_of_phase_epoch_nodes: BTreeMap::new(),
            cluster_state_map: BTreeMap::new(),
        }
    }
}

impl PollReport {
    /// Check if no node changed reachability this round.
    pub fn is_changed_nodes_empty(&self) -> bool {
        self.changed_nodes.is_empty()
    }

    /// Nodes classified unresponsive this round.
    pub fn unresponsive_nodes(&self) -> BTreeSet<NodeId> {
        self.cluster_state_map
            .iter()
            .filter(|(_, state)| !state.is_responsive())
            .map(|(node, _)| node.clone())
            .collect()
    }
}

/// Edge-triggered failure detector.
///
/// Nodes not seen in an earlier round are assumed to have been responsive,
/// so a member that is down from the start shows up as changed in the
/// first round.
#[derive(Debug)]
pub struct FailureDetector {
    ping_retries: u32,
    previous: HashMap<NodeId, Reachability>,
    rounds: u64,
}

impl FailureDetector {
    /// Create a detector that tries each node up to `ping_retries` times a round.
    pub fn new(ping_retries: u32) -> Self {
        Self {
            ping_retries: ping_retries.max(1),
            previous: HashMap::new(),
            rounds: 0,
        }
    }

    /// Completed rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Classification from the last round, if the node was polled.
    pub fn last_seen(&self, node: &str) -> Option<Reachability> {
        self.previous.get(node).copied()
    }

    fn probe_with_retries(&self, prober: &dyn NodeProber, node: &str) -> ClusterState {
        let mut failed = 0;
        while failed < self.ping_retries {
            match prober.probe(node) {
                Ok(reply) => return ClusterState::responsive(reply, failed),
                Err(err) => {
                    failed += 1;
                    tracing::trace!(node, attempt = failed, error = %err, "probe failed");
                }
            }
        }
        ClusterState::unresponsive(failed)
    }

    /// Probe every member of `layout` and report what changed.
    pub fn poll(&mut self, layout: &Layout, prober: &dyn NodeProber) -> PollReport {
        let mut report = PollReport {
            poll_epoch: layout.epoch,
            ..PollReport::default()
        };
        let mut current = HashMap::new();

        for node in layout.members() {
            let state = self.probe_with_retries(prober, &node);
            let before = self
                .previous
                .get(&node)
                .copied()
                .unwrap_or(Reachability::Responsive);
            if before != state.reachability {
                report.changed_nodes.insert(node.clone());
            }
            if state.is_responsive() && state.epoch != layout.epoch {
                report.out_of_phase_epoch_nodes.insert(node.clone(), state.epoch);
            }
            current.insert(node.clone(), state.reachability);
            report.cluster_state_map.insert(node, state);
        }

        self.previous = current;
        self.rounds += 1;

        if !report.is_changed_nodes_empty() || !report.out_of_phase_epoch_nodes.is_empty() {
            tracing::info!(
                poll_epoch = report.poll_epoch,
                changed = ?report.changed_nodes,
                out_of_phase = ?report.out_of_phase_epoch_nodes,
                "poll report"
            );
        } else {
            tracing::debug!(poll_epoch = report.poll_epoch, "poll report unchanged");
        }
        report
    }
}

/// One node as seen by [`StaticProber`].
#[derive(Debug, Clone)]
struct ProbedNode {
    reachable: bool,
    reply: ProbeReply,
    /// Probes to fail before answering again.
    drop_next: u32,
}

/// Prober answering from an in-memory table of nodes.
#[derive(Debug, Default)]
pub struct StaticProber {
    nodes: RwLock<HashMap<NodeId, ProbedNode>>,
}

impl StaticProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a reachable node at `epoch`.
    pub fn set_node(&self, node: &str, epoch: u64) {
        self.nodes.write().insert(
            node.to_string(),
            ProbedNode {
                reachable: true,
                reply: ProbeReply {
                    epoch,
                    global_tail: Address::NON_ADDRESS,
                    sequencer_ready: true,
                },
                drop_next: 0,
            },
        );
    }

    /// Make a node unreachable or reachable again.
    pub fn set_reachable(&self, node: &str, reachable: bool) {
        if let Some(n) = self.nodes.write().get_mut(node) {
            n.reachable = reachable;
        }
    }

    /// Change the epoch a node reports.
    pub fn set_epoch(&self, node: &str, epoch: u64) {
        if let Some(n) = self.nodes.write().get_mut(node) {
            n.reply.epoch = epoch;
        }
    }

    /// Drop the next `count` probes to a node.
    pub fn drop_probes(&self, node: &str, count: u32) {
        if let Some(n) = self.nodes.write().get_mut(node) {
            n.drop_next = count;
        }
    }
}

impl NodeProber for StaticProber {
    fn probe(&self, node: &str) -> TesseraResult<ProbeReply> {
        let mut nodes = self.nodes.write();
        let unreachable = || TesseraError::NodeUnreachable {
            node: node.to_string(),
        };
        let entry = nodes.get_mut(node).ok_or_else(unreachable)?;
        if !entry.reachable {
            return Err(unreachable());
        }
        if entry.drop_next > 0 {
            entry.drop_next -= 1;
            return Err(unreachable());
        }
        Ok(entry.reply.clone())
    }
}
