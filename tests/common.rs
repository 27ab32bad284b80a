//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tessera::control::epoch::EpochFence;
use tessera::control::layout::{Layout, NodeId};
use tessera::core::config::Config;
use tessera::log::address::Address;
use tessera::log::entry::{LogEntry, Mutation};
use tessera::log::stream::StreamId;
use tessera::log::unit::{InMemoryLogUnit, LogUnit};
use tessera::sequencer::{Sequencer, SequencerClient, TokenRequest};

/// A sequencer and log unit serving one epoch.
pub struct TestCluster {
    pub fence: Arc<EpochFence>,
    pub log: Arc<InMemoryLogUnit>,
    pub sequencer: Arc<Sequencer>,
}

impl TestCluster {
    /// Fresh cluster at `epoch` with an empty log.
    pub fn at_epoch(epoch: u64) -> Self {
        let fence = Arc::new(EpochFence::new(epoch));
        let log = Arc::new(InMemoryLogUnit::new());
        log.seal(epoch).expect("seal fresh log");
        let sequencer = Arc::new(Sequencer::new(epoch, fence.clone()));
        Self {
            fence,
            log,
            sequencer,
        }
    }

    /// Append one entry through the sequencer, the way a client would.
    pub fn append(&self, mutations: Vec<Mutation>) -> Address {
        let streams: Vec<StreamId> = mutations.iter().map(|m| m.stream).collect();
        let token = self
            .sequencer
            .request_token(&TokenRequest::single(streams))
            .expect("token")
            .into_token()
            .expect("unconditional token is always issued");
        let entry = LogEntry::data(token.address(), mutations)
            .with_epoch(token.epoch)
            .with_backpointers(token.backpointers.clone());
        self.log.write(entry).expect("write");
        token.address()
    }

    /// Append an unkeyed payload to one stream.
    pub fn append_to(&self, stream: StreamId, payload: &'static str) -> Address {
        self.append(vec![Mutation::new(stream, payload)])
    }
}

/// Stream id from a readable name.
pub fn stream(name: &str) -> StreamId {
    StreamId::from_name(name)
}

/// Node ids `127.0.0.1:9000`, `127.0.0.1:9001`, ...
pub fn nodes(n: usize) -> Vec<NodeId> {
    (0..n).map(|i| format!("127.0.0.1:{}", 9000 + i)).collect()
}

/// Bootstrap layout over `n` nodes, moved to `epoch`.
pub fn layout_at(n: usize, epoch: u64) -> Layout {
    Layout::bootstrap(&nodes(n)).with_epoch(epoch)
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[node]
endpoint = "127.0.0.1:9000"
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a single-node config persisting its layout under `dir`.
pub fn create_config_in_dir(dir: &std::path::Path, poll_interval_ms: u64) -> NamedTempFile {
    let layout_file = dir.join("layout.json");
    let config_content = format!(
        r#"
[node]
endpoint = "127.0.0.1:9000"

[management]
poll_interval_ms = {}
recovery_retry_interval_ms = 10

[paths]
layout_file = "{}"
"#,
        poll_interval_ms,
        layout_file.display()
    );

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// Create a temporary directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}
