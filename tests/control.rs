//! Control plane tests: layouts, consensus, failure detection, recovery.

mod common;

use common::{layout_at, nodes, temp_test_dir};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tessera::control::consensus::{
    CachedLayoutView, InMemoryLayoutConsensus, LayoutConsensus, LayoutView,
};
use tessera::control::detector::{FailureDetector, Reachability, StaticProber};
use tessera::control::epoch::EpochFence;
use tessera::control::layout::{Layout, LayoutSegment, NodeEndpoint, BOOTSTRAP_EPOCH};
use tessera::control::membership::MembershipManager;
use tessera::control::recovery::{decide, RecoveryCoordinator, RecoveryStep, RetryReason};
use tessera::control::store::{FileLayoutStore, InMemoryLayoutStore, LayoutStore};
use tessera::core::error::{TesseraError, TesseraResult};
use tessera::core::time::{RecordingSleeper, RetryInterval, Sleeper};
use tessera::log::address::Address;
use tessera::ops::observability::{metrics, MetricsRegistry};

// ============================================================================
// Layout tests
// ============================================================================

#[test]
fn bootstrap_layout_is_valid_at_epoch_one() {
    let layout = Layout::bootstrap(&nodes(3));
    assert_eq!(layout.epoch, BOOTSTRAP_EPOCH);
    assert!(layout.validate().is_ok());
    assert_eq!(layout.quorum(), 2);
    assert_eq!(layout.members().len(), 3);
    assert_eq!(layout.primary_sequencer(), Some(&nodes(3)[0]));
    assert!(layout.segment_for(Address::new(1_000_000)).is_some());
}

#[test]
fn layout_at_invalid_epoch_is_rejected() {
    let layout = Layout::bootstrap(&nodes(1)).with_epoch(0);
    assert!(layout.validate().is_err());
}

#[test]
fn layout_segments_must_be_contiguous() {
    let mut layout = Layout::bootstrap(&nodes(2));
    layout.segments = vec![
        LayoutSegment {
            start: Address::ZERO,
            end: Address::new(99),
            log_servers: nodes(2),
        },
        LayoutSegment {
            start: Address::new(100),
            end: Address::NON_ADDRESS,
            log_servers: nodes(1),
        },
    ];
    assert!(layout.validate().is_ok());
    assert_eq!(layout.segment_for(Address::new(150)).unwrap().log_servers.len(), 1);

    layout.segments[1].start = Address::new(101);
    assert!(layout.validate().is_err());
}

#[test]
fn empty_host_is_reported_as_empty_address() {
    let err = NodeEndpoint::parse(":9000").unwrap_err();
    assert_eq!(
        err,
        TesseraError::EmptyAddress {
            node: ":9000".to_string()
        }
    );

    assert!(matches!(
        NodeEndpoint::parse("localhost"),
        Err(TesseraError::InvalidRequest { .. })
    ));

    let endpoint = NodeEndpoint::parse("10.0.0.1:9100").unwrap();
    assert_eq!(endpoint.port, 9100);
    assert_eq!(endpoint.to_string(), "10.0.0.1:9100");
}

#[test]
fn layout_with_unresolvable_member_is_invalid() {
    let layout = Layout::bootstrap(&[":9000".to_string()]);
    assert!(matches!(
        layout.validate(),
        Err(TesseraError::EmptyAddress { .. })
    ));
}

#[test]
fn mark_unresponsive_is_idempotent() {
    let mut layout = layout_at(3, 2);
    let node = &nodes(3)[1];
    assert!(layout.mark_unresponsive(node));
    assert!(!layout.mark_unresponsive(node));
    assert!(layout.is_unresponsive(node));
}

// ============================================================================
// Layout store tests
// ============================================================================

#[test]
fn file_store_round_trips_layout() {
    let dir = temp_test_dir();
    let store = FileLayoutStore::new(dir.path().join("nested/layout.json"));

    assert_eq!(store.load().unwrap(), None);

    let layout = layout_at(3, 4);
    store.save(&layout).unwrap();
    assert_eq!(store.load().unwrap(), Some(layout.clone()));

    let newer = layout.next_epoch();
    store.save(&newer).unwrap();
    assert_eq!(store.load().unwrap().unwrap().epoch, 5);
}

#[test]
fn corrupt_layout_file_is_a_storage_error() {
    let dir = temp_test_dir();
    let path = dir.path().join("layout.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = FileLayoutStore::new(&path).load().unwrap_err();
    assert!(matches!(err, TesseraError::Storage { .. }));
}

// ============================================================================
// Consensus tests
// ============================================================================

#[test]
fn proposal_needs_a_newer_epoch() {
    let consensus = InMemoryLayoutConsensus::new(&layout_at(3, 1));

    assert!(consensus.propose(&layout_at(3, 2)).unwrap());
    assert!(!consensus.propose(&layout_at(3, 2)).unwrap());
    assert!(!consensus.propose(&layout_at(3, 1)).unwrap());
    assert_eq!(consensus.committed().unwrap().epoch, 2);
}

#[test]
fn proposal_fails_without_reachable_majority() {
    let members = nodes(3);
    let consensus = InMemoryLayoutConsensus::new(&layout_at(3, 1));
    consensus.set_reachable(&members[1], false);
    consensus.set_reachable(&members[2], false);

    assert!(!consensus.propose(&layout_at(3, 2)).unwrap());
    assert!(matches!(
        consensus.committed(),
        Err(TesseraError::NodeUnreachable { .. })
    ));
}

#[test]
fn majority_accepts_while_minority_is_partitioned() {
    let members = nodes(3);
    let consensus = InMemoryLayoutConsensus::new(&layout_at(3, 1));
    consensus.set_reachable(&members[2], false);

    assert!(consensus.propose(&layout_at(3, 2)).unwrap());
    let epochs = consensus.accepted_epochs();
    assert_eq!(epochs[&members[0]], 2);
    assert_eq!(epochs[&members[1]], 2);
    assert_eq!(epochs[&members[2]], 1);

    consensus.set_reachable(&members[2], true);
    assert_eq!(consensus.committed().unwrap().epoch, 2);
}

#[test]
fn empty_acceptors_accept_the_bootstrap_layout() {
    let consensus = InMemoryLayoutConsensus::empty(&nodes(3));
    assert!(matches!(
        consensus.committed(),
        Err(TesseraError::Internal { .. })
    ));

    assert!(consensus.propose(&layout_at(3, BOOTSTRAP_EPOCH)).unwrap());
    assert_eq!(consensus.committed().unwrap().epoch, BOOTSTRAP_EPOCH);
}

#[test]
fn cached_view_serves_cache_until_invalidated() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 1)));
    let view = CachedLayoutView::new(consensus.clone());
    assert_eq!(view.peek(), None);

    assert_eq!(view.layout().unwrap().epoch, 1);
    consensus.propose(&layout_at(3, 2)).unwrap();
    assert_eq!(view.layout().unwrap().epoch, 1);
    assert_eq!(view.peek().unwrap().epoch, 1);

    view.invalidate();
    assert_eq!(view.peek(), None);
    assert_eq!(view.layout().unwrap().epoch, 2);
}

// ============================================================================
// Failure detector tests
// ============================================================================

fn prober_for(layout: &Layout) -> StaticProber {
    let prober = StaticProber::new();
    for node in layout.members() {
        prober.set_node(&node, layout.epoch);
    }
    prober
}

#[test]
fn healthy_cluster_reports_no_changes() {
    let layout = layout_at(3, 2);
    let prober = prober_for(&layout);
    let mut detector = FailureDetector::new(3);

    let report = detector.poll(&layout, &prober);
    assert_eq!(report.poll_epoch, 2);
    assert!(report.is_changed_nodes_empty());
    assert!(report.out_of_phase_epoch_nodes.is_empty());
    assert_eq!(report.cluster_state_map.len(), 3);
    assert!(report.unresponsive_nodes().is_empty());
    assert_eq!(detector.rounds(), 1);
}

#[test]
fn reachability_changes_are_edge_triggered() {
    let layout = layout_at(3, 1);
    let node = nodes(3)[2].clone();
    let prober = prober_for(&layout);
    let mut detector = FailureDetector::new(2);

    prober.set_reachable(&node, false);
    let first = detector.poll(&layout, &prober);
    assert!(first.changed_nodes.contains(&node));
    assert!(first.unresponsive_nodes().contains(&node));
    assert_eq!(detector.last_seen(&node), Some(Reachability::Unresponsive));

    let second = detector.poll(&layout, &prober);
    assert!(second.is_changed_nodes_empty());
    assert!(second.unresponsive_nodes().contains(&node));

    prober.set_reachable(&node, true);
    let third = detector.poll(&layout, &prober);
    assert_eq!(third.changed_nodes.len(), 1);
    assert!(third.changed_nodes.contains(&node));
    assert_eq!(detector.last_seen(&node), Some(Reachability::Responsive));
}

#[test]
fn dropped_probes_within_retry_budget_stay_responsive() {
    let layout = layout_at(1, 1);
    let node = nodes(1)[0].clone();
    let prober = prober_for(&layout);
    let mut detector = FailureDetector::new(3);

    prober.drop_probes(&node, 2);
    let report = detector.poll(&layout, &prober);
    let state = &report.cluster_state_map[&node];
    assert!(state.is_responsive());
    assert_eq!(state.failed_probes, 2);
    assert!(report.is_changed_nodes_empty());

    prober.drop_probes(&node, 3);
    let report = detector.poll(&layout, &prober);
    let state = &report.cluster_state_map[&node];
    assert!(!state.is_responsive());
    assert_eq!(state.failed_probes, 3);
    assert!(report.changed_nodes.contains(&node));
}

#[test]
fn zero_retries_still_probes_once() {
    let layout = layout_at(1, 1);
    let node = nodes(1)[0].clone();
    let prober = prober_for(&layout);
    let mut detector = FailureDetector::new(0);

    assert!(detector.poll(&layout, &prober).unresponsive_nodes().is_empty());

    prober.drop_probes(&node, 1);
    assert!(detector.poll(&layout, &prober).unresponsive_nodes().contains(&node));
}

#[test]
fn out_of_phase_nodes_report_their_epoch() {
    let layout = layout_at(3, 2);
    let members = nodes(3);
    let prober = prober_for(&layout);
    prober.set_epoch(&members[0], 1);
    prober.set_epoch(&members[1], 3);
    prober.set_reachable(&members[2], false);
    prober.set_epoch(&members[2], 7);

    let report = FailureDetector::new(1).poll(&layout, &prober);
    assert_eq!(report.out_of_phase_epoch_nodes.len(), 2);
    assert_eq!(report.out_of_phase_epoch_nodes[&members[0]], 1);
    assert_eq!(report.out_of_phase_epoch_nodes[&members[1]], 3);
    // Unresponsive nodes are never out of phase.
    assert!(!report.out_of_phase_epoch_nodes.contains_key(&members[2]));
}

// ============================================================================
// Membership tests
// ============================================================================

#[test]
fn add_and_remove_node_produce_next_epoch_layouts() {
    let base = layout_at(2, 4);
    let joining = nodes(3)[2].clone();

    let grown = base.add_node(&joining).unwrap();
    assert_eq!(grown.epoch, 5);
    assert_eq!(grown.layout_servers.len(), 3);
    assert!(grown.sequencers.contains(&joining));
    assert!(grown.segments.last().unwrap().log_servers.contains(&joining));
    assert!(grown.validate().is_ok());

    let shrunk = grown.remove_node(&nodes(3)[0]).unwrap();
    assert_eq!(shrunk.epoch, 6);
    assert!(!shrunk.contains(&nodes(3)[0]));
    assert_eq!(shrunk.primary_sequencer(), Some(&nodes(3)[1]));

    assert!(base.add_node(&nodes(2)[0]).is_err());
    assert!(base.add_node("no-port").is_err());
    assert!(base.remove_node("127.0.0.1:9999").is_err());
    // A layout cannot lose its last member.
    assert!(layout_at(1, 1).remove_node(&nodes(1)[0]).is_err());
}

#[test]
fn resize_lands_at_the_next_epoch() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 1)));
    let store = Arc::new(InMemoryLayoutStore::new());
    let fence = Arc::new(EpochFence::new(1));
    let registry = Arc::new(MetricsRegistry::new());
    let membership = MembershipManager::new(
        Arc::new(CachedLayoutView::new(consensus.clone())),
        consensus.clone(),
    )
    .with_store(store.clone())
    .with_fence(fence.clone())
    .with_metrics(registry.clone());
    let leaving = nodes(3)[2].clone();

    let shrunk = membership.remove_node(&leaving).unwrap().unwrap();
    assert_eq!(shrunk.epoch, 2);
    assert!(!shrunk.contains(&leaving));
    assert_eq!(consensus.committed().unwrap(), shrunk);
    assert_eq!(store.load().unwrap().unwrap(), shrunk);
    assert_eq!(fence.current(), 2);

    let restored = membership.add_node(&leaving).unwrap().unwrap();
    assert_eq!(restored.epoch, 3);
    assert_eq!(restored.members().len(), 3);
    assert_eq!(registry.gauge_get(metrics::LAYOUT_EPOCH), 3);
}

#[test]
fn resize_from_a_stale_layout_loses() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 1)));
    let fresh_view = Arc::new(CachedLayoutView::new(consensus.clone()));
    let stale_view = Arc::new(CachedLayoutView::new(consensus.clone()));
    assert_eq!(stale_view.layout().unwrap().epoch, 1);

    let first = MembershipManager::new(fresh_view, consensus.clone());
    let second = MembershipManager::new(stale_view.clone(), consensus.clone());

    let joined = first.add_node("127.0.0.1:9003").unwrap().unwrap();
    assert_eq!(joined.epoch, 2);

    // Computed from the cached epoch-1 layout, so it competes for epoch 2.
    assert_eq!(second.remove_node(&nodes(3)[1]).unwrap(), None);
    assert!(stale_view.peek().is_none());
    assert_eq!(consensus.committed().unwrap(), joined);

    let retried = second.remove_node(&nodes(3)[1]).unwrap().unwrap();
    assert_eq!(retried.epoch, 3);
    assert!(retried.contains("127.0.0.1:9003"));
    assert!(!retried.contains(&nodes(3)[1]));
}

// ============================================================================
// Recovery decision tests
// ============================================================================

#[test]
fn winning_proposal_recovers() {
    let cluster = layout_at(3, 3);
    let step = decide(2, true, Ok(&cluster));
    assert_eq!(
        step,
        RecoveryStep::Recovered {
            layout: cluster,
            won_proposal: true
        }
    );
}

#[test]
fn losing_proposal_adopts_newer_cluster_layout() {
    let cluster = layout_at(3, 3);
    match decide(1, false, Ok(&cluster)) {
        RecoveryStep::Recovered {
            layout,
            won_proposal,
        } => {
            assert_eq!(layout.epoch, 3);
            assert!(!won_proposal);
        }
        other => panic!("expected recovery, got {other:?}"),
    }
}

#[test]
fn losing_proposal_without_newer_cluster_retries() {
    let cluster = layout_at(3, 2);
    assert_eq!(
        decide(2, false, Ok(&cluster)),
        RecoveryStep::Retry(RetryReason::NotAhead {
            local_epoch: 2,
            cluster_epoch: 2
        })
    );
}

#[test]
fn unavailable_cluster_retries_even_after_winning() {
    let err = TesseraError::NodeUnreachable {
        node: "layout quorum".to_string(),
    };
    assert!(matches!(
        decide(2, true, Err(&err)),
        RecoveryStep::Retry(RetryReason::ClusterUnavailable { .. })
    ));
}

// ============================================================================
// Recovery coordinator tests
// ============================================================================

fn coordinator_for(
    local: Layout,
    consensus: Arc<InMemoryLayoutConsensus>,
    sleeper: Arc<dyn Sleeper>,
) -> (RecoveryCoordinator, Arc<InMemoryLayoutStore>) {
    let store = Arc::new(InMemoryLayoutStore::with_layout(local));
    let coordinator = RecoveryCoordinator::new(
        store.clone(),
        consensus.clone(),
        consensus,
        sleeper,
    )
    .with_interval(RetryInterval::from_ms(25));
    (coordinator, store)
}

#[test]
fn lagging_node_recovers_to_cluster_epoch() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fence = Arc::new(EpochFence::new(1));
    let metrics = Arc::new(MetricsRegistry::new());

    let (coordinator, store) = coordinator_for(layout_at(3, 1), consensus, sleeper.clone());
    let coordinator = coordinator
        .with_fence(fence.clone())
        .with_metrics(metrics.clone());

    let report = coordinator.retry_until_recovery().unwrap().unwrap();
    assert_eq!(report.layout.epoch, 2);
    assert!(!report.won_proposal);
    assert_eq!(report.attempts, 1);
    assert_eq!(sleeper.count(), 0);

    assert_eq!(store.load().unwrap().unwrap().epoch, 2);
    assert_eq!(fence.current(), 2);
    assert_eq!(metrics.gauge_get(metrics::LAYOUT_EPOCH), 2);
    assert_eq!(metrics.counter_get(metrics::RECOVERY_ATTEMPTS), 1);
}

#[test]
fn nodes_at_one_two_two_converge_on_epoch_three() {
    let members = nodes(3);
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());

    let (a, store_a) = coordinator_for(layout_at(3, 1), consensus.clone(), sleeper.clone());
    let (b, store_b) = coordinator_for(layout_at(3, 2), consensus.clone(), sleeper.clone());
    let (c, store_c) = coordinator_for(layout_at(3, 2), consensus.clone(), sleeper);

    let b_report = b.retry_until_recovery().unwrap().unwrap();
    let c_report = c.retry_until_recovery().unwrap().unwrap();
    let a_report = a.retry_until_recovery().unwrap().unwrap();

    assert!(b_report.won_proposal);
    assert!(!c_report.won_proposal);
    assert!(!a_report.won_proposal);
    for store in [&store_a, &store_b, &store_c] {
        assert_eq!(store.load().unwrap().unwrap().epoch, 3);
    }
    for member in &members {
        assert_eq!(consensus.accepted_epochs()[member], 3);
    }
}

#[test]
fn concurrent_recovery_has_exactly_one_winner() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());
    let coordinators: Vec<_> = [1, 2, 2]
        .into_iter()
        .map(|epoch| coordinator_for(layout_at(3, epoch), consensus.clone(), sleeper.clone()))
        .collect();

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = coordinators
            .iter()
            .map(|(coordinator, _)| scope.spawn(move || coordinator.retry_until_recovery()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().unwrap())
            .collect()
    });

    // The node starting at epoch 1 can only propose epoch 2, which is
    // already promised everywhere.
    assert!(!reports[0].won_proposal);
    assert_eq!(reports.iter().filter(|r| r.won_proposal).count(), 1);
    assert_eq!(consensus.committed().unwrap().epoch, 3);

    for (i, (_, store)) in coordinators.iter().enumerate() {
        let epoch = store.load().unwrap().unwrap().epoch;
        if i == 0 {
            assert!(epoch == 2 || epoch == 3);
        } else {
            assert_eq!(epoch, 3);
        }
    }
}

/// Heals every acceptor after a number of sleeps.
struct HealingSleeper {
    consensus: Arc<InMemoryLayoutConsensus>,
    heal_after: usize,
    sleeps: AtomicUsize,
}

impl Sleeper for HealingSleeper {
    fn sleep(&self, _duration: Duration) {
        let slept = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
        if slept == self.heal_after {
            for node in nodes(3) {
                self.consensus.set_reachable(&node, true);
            }
        }
    }
}

#[test]
fn partitioned_node_retries_until_quorum_returns() {
    let members = nodes(3);
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    consensus.set_reachable(&members[1], false);
    consensus.set_reachable(&members[2], false);

    let sleeper = Arc::new(HealingSleeper {
        consensus: consensus.clone(),
        heal_after: 3,
        sleeps: AtomicUsize::new(0),
    });
    let (coordinator, store) = coordinator_for(layout_at(3, 2), consensus, sleeper.clone());

    let report = coordinator.retry_until_recovery().unwrap().unwrap();
    assert_eq!(report.attempts, 4);
    assert!(report.won_proposal);
    assert_eq!(report.layout.epoch, 3);
    assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 3);
    assert_eq!(store.load().unwrap().unwrap().epoch, 3);
}

#[test]
fn unreachable_quorum_is_reported_as_cluster_unavailable() {
    let members = nodes(3);
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    consensus.set_reachable(&members[1], false);
    consensus.set_reachable(&members[2], false);
    let (coordinator, _) = coordinator_for(
        layout_at(3, 2),
        consensus,
        Arc::new(RecordingSleeper::new()),
    );

    match coordinator.run_recovery_attempt().unwrap() {
        RecoveryStep::Retry(RetryReason::ClusterUnavailable { message }) => {
            assert!(message.contains("unreachable"), "{message}");
        }
        other => panic!("expected retry, got {other:?}"),
    }
}

/// Consensus that never accepts anything.
struct RejectingConsensus;

impl LayoutConsensus for RejectingConsensus {
    fn propose(&self, _layout: &Layout) -> TesseraResult<bool> {
        Ok(false)
    }
}

/// Sets a stop flag on its nth sleep.
struct StoppingSleeper {
    flag: OnceLock<Arc<AtomicBool>>,
    stop_after: usize,
    recorder: RecordingSleeper,
}

impl Sleeper for StoppingSleeper {
    fn sleep(&self, duration: Duration) {
        self.recorder.sleep(duration);
        if self.recorder.count() >= self.stop_after {
            if let Some(flag) = self.flag.get() {
                flag.store(true, Ordering::Release);
            }
        }
    }
}

#[test]
fn stop_handle_ends_an_unbounded_retry_loop() {
    let view = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let store = Arc::new(InMemoryLayoutStore::with_layout(layout_at(3, 2)));
    let sleeper = Arc::new(StoppingSleeper {
        flag: OnceLock::new(),
        stop_after: 5,
        recorder: RecordingSleeper::new(),
    });

    let coordinator = RecoveryCoordinator::new(
        store.clone(),
        Arc::new(RejectingConsensus),
        view,
        sleeper.clone(),
    )
    .with_interval(RetryInterval::from_ms(40));
    sleeper.flag.set(coordinator.stop_handle()).unwrap();

    assert_eq!(coordinator.retry_until_recovery().unwrap(), None);
    assert_eq!(sleeper.recorder.count(), 5);
    assert!(sleeper
        .recorder
        .recorded()
        .iter()
        .all(|d| *d == Duration::from_millis(40)));
    // Nothing was adopted.
    assert_eq!(store.load().unwrap().unwrap().epoch, 2);
}

#[test]
fn stopped_coordinator_makes_no_attempt() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let (coordinator, store) = coordinator_for(
        layout_at(3, 1),
        consensus,
        Arc::new(RecordingSleeper::new()),
    );
    coordinator.stop_handle().store(true, Ordering::Release);

    assert_eq!(coordinator.retry_until_recovery().unwrap(), None);
    assert_eq!(store.load().unwrap().unwrap().epoch, 1);
}

#[test]
fn missing_local_layout_is_a_storage_error() {
    let consensus = Arc::new(InMemoryLayoutConsensus::new(&layout_at(3, 2)));
    let coordinator = RecoveryCoordinator::new(
        Arc::new(InMemoryLayoutStore::new()),
        consensus.clone(),
        consensus,
        Arc::new(RecordingSleeper::new()),
    );
    assert!(matches!(
        coordinator.run_recovery_attempt(),
        Err(TesseraError::Storage { .. })
    ));
}
