//! Configuration parsing and validation.
//!
//! Tessera configuration is loaded from TOML files with CLI overrides.
//! Sections follow the node's components: identity, cluster membership,
//! management loops, transactions, telemetry, and paths.

use crate::control::layout::{Layout, NodeEndpoint, NodeId};
use crate::core::time::RetryInterval;
use crate::txn::context::ConflictGranularity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level Tessera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This node's identity.
    pub node: NodeConfig,

    /// Cluster membership used to bootstrap a layout.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Failure detection and recovery loops.
    #[serde(default)]
    pub management: ManagementConfig,

    /// Transaction behaviour.
    #[serde(default)]
    pub transactions: TransactionsConfig,

    /// Telemetry and observability configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathConfig,
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identifier used in layouts; defaults to the endpoint.
    #[serde(default)]
    pub node_id: Option<NodeId>,

    /// Endpoint this node is reachable at (`host:port`).
    pub endpoint: String,
}

/// Cluster membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Member endpoints. Empty means a single-node cluster of this node.
    #[serde(default)]
    pub members: Vec<NodeId>,
}

/// Management loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Interval between failure-detector rounds, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Probes per node per round before it is considered unresponsive.
    #[serde(default = "default_ping_retries")]
    pub ping_retries: u32,

    /// Fixed backoff between layout recovery attempts, in milliseconds.
    #[serde(default = "default_recovery_retry_interval_ms")]
    pub recovery_retry_interval_ms: u64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            ping_retries: default_ping_retries(),
            recovery_retry_interval_ms: default_recovery_retry_interval_ms(),
        }
    }
}

impl ManagementConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recovery_retry_interval(&self) -> RetryInterval {
        RetryInterval::from_ms(self.recovery_retry_interval_ms)
    }
}

/// Transaction configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionsConfig {
    /// "stream" or "key".
    #[serde(default)]
    pub conflict_granularity: ConflictGranularity,
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Filesystem path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Where the last known layout is persisted.
    #[serde(default = "default_layout_file")]
    pub layout_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            layout_file: default_layout_file(),
        }
    }
}

// Default value functions

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_ping_retries() -> u32 {
    3
}

fn default_recovery_retry_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_layout_file() -> PathBuf {
    PathBuf::from("data/layout.json")
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref layout_file) = overrides.layout_file {
            self.paths.layout_file = layout_file.clone();
        }
        if let Some(ref endpoint) = overrides.endpoint {
            self.node.endpoint = endpoint.clone();
        }
        if let Some(granularity) = overrides.conflict_granularity {
            self.transactions.conflict_granularity = granularity;
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.node
            .node_id
            .clone()
            .unwrap_or_else(|| self.node.endpoint.clone())
    }

    /// Cluster members, falling back to this node alone.
    pub fn members(&self) -> Vec<NodeId> {
        if self.cluster.members.is_empty() {
            vec![self.node_id()]
        } else {
            self.cluster.members.clone()
        }
    }

    /// Layout used when no layout has been persisted yet.
    pub fn bootstrap_layout(&self) -> Layout {
        Layout::bootstrap(&self.members())
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_node()?;
        self.validate_cluster()?;
        self.validate_management()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        NodeEndpoint::parse(&self.node.endpoint)
            .with_context(|| format!("node.endpoint is invalid: {:?}", self.node.endpoint))?;
        if let Some(ref node_id) = self.node.node_id {
            if node_id.trim().is_empty() {
                anyhow::bail!("node.node_id must not be empty");
            }
            // The id is this node's layout member name.
            NodeEndpoint::parse(node_id)
                .with_context(|| format!("node.node_id is not host:port: {node_id:?}"))?;
        }
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        for member in &self.cluster.members {
            NodeEndpoint::parse(member)
                .with_context(|| format!("cluster.members entry is invalid: {member:?}"))?;
        }
        if !self.cluster.members.is_empty() && !self.cluster.members.contains(&self.node_id()) {
            anyhow::bail!(
                "cluster.members must include this node ({})",
                self.node_id()
            );
        }
        Ok(())
    }

    fn validate_management(&self) -> Result<()> {
        if self.management.poll_interval_ms == 0 {
            anyhow::bail!("management.poll_interval_ms must be > 0");
        }
        if self.management.ping_retries == 0 {
            anyhow::bail!("management.ping_retries must be >= 1");
        }
        if self.management.recovery_retry_interval_ms == 0 {
            anyhow::bail!("management.recovery_retry_interval_ms must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override layout file path.
    pub layout_file: Option<PathBuf>,
    /// Override node endpoint.
    pub endpoint: Option<String>,
    /// Override conflict granularity.
    pub conflict_granularity: Option<ConflictGranularity>,
}
