//! Cluster layout.
//!
//! A layout names the cluster members, which node sequences, which nodes
//! serve which address segments, and the epoch it is valid for. At most
//! one layout is accepted by a majority per epoch.

use crate::core::error::{TesseraError, TesseraResult};
use crate::log::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reserved epoch for "no layout yet". Real layouts start at 1.
pub const INVALID_EPOCH: u64 = 0;

/// First epoch of a freshly bootstrapped cluster.
pub const BOOTSTRAP_EPOCH: u64 = 1;

/// Node identifier; the node's `host:port` endpoint.
pub type NodeId = String;

/// A resolved `host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
}

impl NodeEndpoint {
    /// Parse `host:port`.
    ///
    /// An empty host means the node's address could not be resolved and is
    /// reported as [`TesseraError::EmptyAddress`].
    pub fn parse(node: &str) -> TesseraResult<Self> {
        let (host, port) = node
            .rsplit_once(':')
            .ok_or_else(|| TesseraError::invalid(format!("endpoint {node:?} is missing a port")))?;
        if host.trim().is_empty() {
            return Err(TesseraError::EmptyAddress {
                node: node.to_string(),
            });
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TesseraError::invalid(format!("endpoint {node:?} has an invalid port")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A contiguous address segment and the log servers replicating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSegment {
    /// First address of the segment.
    pub start: Address,
    /// Last address of the segment, `NON_ADDRESS` for the open tail segment.
    pub end: Address,
    /// Log servers, in chain order.
    pub log_servers: Vec<NodeId>,
}

impl LayoutSegment {
    /// Check if this segment is the open-ended tail segment.
    pub fn is_open(&self) -> bool {
        !self.end.is_address()
    }

    /// Check if the segment covers an address.
    pub fn covers(&self, address: Address) -> bool {
        address >= self.start && (self.is_open() || address <= self.end)
    }
}

/// Cluster membership and address assignment for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub epoch: u64,
    /// Nodes participating in layout consensus.
    pub layout_servers: Vec<NodeId>,
    /// Sequencers; the first one is primary.
    pub sequencers: Vec<NodeId>,
    /// Address segments, ordered and contiguous.
    pub segments: Vec<LayoutSegment>,
    /// Members currently considered unresponsive.
    #[serde(default)]
    pub unresponsive_servers: Vec<NodeId>,
}

impl Layout {
    /// A bootstrap layout where every member plays every role.
    pub fn bootstrap(members: &[NodeId]) -> Self {
        Self {
            epoch: BOOTSTRAP_EPOCH,
            layout_servers: members.to_vec(),
            sequencers: members.to_vec(),
            segments: vec![LayoutSegment {
                start: Address::ZERO,
                end: Address::NON_ADDRESS,
                log_servers: members.to_vec(),
            }],
            unresponsive_servers: Vec::new(),
        }
    }

    /// Copy of this layout at another epoch.
    pub fn with_epoch(&self, epoch: u64) -> Self {
        Self {
            epoch,
            ..self.clone()
        }
    }

    /// Copy of this layout at the next epoch.
    pub fn next_epoch(&self) -> Self {
        self.with_epoch(self.epoch + 1)
    }

    /// Every node named anywhere in the layout.
    pub fn members(&self) -> BTreeSet<NodeId> {
        self.layout_servers
            .iter()
            .chain(self.sequencers.iter())
            .chain(self.segments.iter().flat_map(|s| s.log_servers.iter()))
            .cloned()
            .collect()
    }

    /// Check if a node is part of this layout.
    pub fn contains(&self, node: &str) -> bool {
        self.members().contains(node)
    }

    /// The primary sequencer, if any.
    pub fn primary_sequencer(&self) -> Option<&NodeId> {
        self.sequencers.first()
    }

    /// The segment holding an address.
    pub fn segment_for(&self, address: Address) -> Option<&LayoutSegment> {
        self.segments.iter().find(|s| s.covers(address))
    }

    /// Majority size of the layout servers.
    pub fn quorum(&self) -> usize {
        self.layout_servers.len() / 2 + 1
    }

    /// The next-epoch layout with `node` added.
    ///
    /// The node joins the layout servers, the sequencers, and the open tail
    /// segment. Closed segments keep their replicas.
    pub fn add_node(&self, node: &str) -> TesseraResult<Layout> {
        NodeEndpoint::parse(node)?;
        if self.contains(node) {
            return Err(TesseraError::invalid(format!("{node} is already a member")));
        }
        let mut next = self.next_epoch();
        next.layout_servers.push(node.to_string());
        next.sequencers.push(node.to_string());
        if let Some(tail) = next.segments.last_mut() {
            tail.log_servers.push(node.to_string());
        }
        next.validate()?;
        Ok(next)
    }

    /// The next-epoch layout with `node` removed from every role.
    pub fn remove_node(&self, node: &str) -> TesseraResult<Layout> {
        if !self.contains(node) {
            return Err(TesseraError::invalid(format!("{node} is not a member")));
        }
        let mut next = self.next_epoch();
        next.layout_servers.retain(|n| n != node);
        next.sequencers.retain(|n| n != node);
        next.unresponsive_servers.retain(|n| n != node);
        for segment in &mut next.segments {
            segment.log_servers.retain(|n| n != node);
        }
        next.validate()?;
        Ok(next)
    }

    /// Record a node as unresponsive. Returns false if it already was.
    pub fn mark_unresponsive(&mut self, node: &str) -> bool {
        if self.unresponsive_servers.iter().any(|n| n == node) {
            return false;
        }
        self.unresponsive_servers.push(node.to_string());
        true
    }

    /// Check if a node is marked unresponsive.
    pub fn is_unresponsive(&self, node: &str) -> bool {
        self.unresponsive_servers.iter().any(|n| n == node)
    }

    /// Validate structural consistency.
    pub fn validate(&self) -> TesseraResult<()> {
        if self.epoch == INVALID_EPOCH {
            return Err(TesseraError::invalid("layout epoch is the invalid epoch"));
        }
        if self.layout_servers.is_empty() {
            return Err(TesseraError::invalid("layout has no layout servers"));
        }
        if self.sequencers.is_empty() {
            return Err(TesseraError::invalid("layout has no sequencers"));
        }
        if self.segments.is_empty() {
            return Err(TesseraError::invalid("layout has no segments"));
        }
        for node in self.members() {
            NodeEndpoint::parse(&node)?;
        }

        let mut expected_start = Address::ZERO;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.log_servers.is_empty() {
                return Err(TesseraError::invalid(format!("segment {i} has no log servers")));
            }
            if segment.start != expected_start {
                return Err(TesseraError::invalid(format!(
                    "segment {i} starts at {}, expected {}",
                    segment.start, expected_start
                )));
            }
            let last = i + 1 == self.segments.len();
            match (segment.is_open(), last) {
                (true, true) => {}
                (true, false) => {
                    return Err(TesseraError::invalid(format!(
                        "segment {i} is open but not last"
                    )))
                }
                (false, _) if segment.end < segment.start => {
                    return Err(TesseraError::invalid(format!("segment {i} ends before it starts")))
                }
                (false, _) => expected_start = segment.end.next(),
            }
        }
        Ok(())
    }
}
