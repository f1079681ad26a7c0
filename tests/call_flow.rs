//! Integration tests for the self-managed call flow
//!
//! The coordinator is bound to the simulated telephony stack and driven
//! through the public handle:
//! - Incoming call answered and dropped
//! - Busy rejection while a connection is live
//! - Missing permissions
//! - Stop racing an active call

use std::sync::Arc;

use hello_oboe::engine::DesktopStubBackend;
use hello_oboe::error::{CallError, ErrorCode};
use hello_oboe::telemetry::StubTimeSource;
use hello_oboe::telephony::simulated::{PeerCall, SimulatedTelephony};
use hello_oboe::telephony::{
    BindingState, ConnectionPeer, ConnectionState, DisconnectCause, Permission,
    StaticPermissions,
};
use hello_oboe::{
    AppConfig, BroadcastPresenter, Coordinator, CoordinatorHandle, CoordinatorParts,
    CoordinatorSnapshot, RejectionReason, UiEvent,
};
use tokio::sync::broadcast;

struct CallHarness {
    handle: CoordinatorHandle,
    telephony: SimulatedTelephony,
    permissions: Arc<StaticPermissions>,
    events: broadcast::Receiver<UiEvent>,
}

impl CallHarness {
    fn new(permissions: StaticPermissions) -> Self {
        let telephony = SimulatedTelephony::new();
        let permissions = Arc::new(permissions);
        let presenter = BroadcastPresenter::new(1024);
        let events = presenter.subscribe();

        let handle = Coordinator::spawn(CoordinatorParts {
            config: AppConfig::default(),
            backend: Arc::new(DesktopStubBackend::new()),
            connector: telephony.connector(),
            permissions: permissions.clone(),
            presenter: Arc::new(presenter),
            time_source: Arc::new(StubTimeSource::new()),
        });

        Self {
            handle,
            telephony,
            permissions,
            events,
        }
    }

    async fn wait_for<F>(&self, mut pred: F) -> CoordinatorSnapshot
    where
        F: FnMut(&CoordinatorSnapshot) -> bool,
    {
        for _ in 0..500 {
            let snapshot = self.handle.snapshot().await.expect("coordinator alive");
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("coordinator never reached the expected state");
    }

    async fn bind(&self) {
        self.handle.start();
        self.wait_for(|s| s.binding == BindingState::Bound).await;
    }

    async fn ring(&self) -> CoordinatorSnapshot {
        self.bind().await;
        self.handle.request_incoming();
        self.wait_for(|s| {
            s.connection.map(|c| c.state) == Some(ConnectionState::Ringing)
                && !s.call_request_pending
        })
        .await
    }

    fn drain(&mut self) -> Vec<UiEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn labels(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::CallStateChanged { label } => Some(label),
                _ => None,
            })
            .collect()
    }
}

fn rejections(events: &[UiEvent]) -> Vec<(RejectionReason, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::CommandRejected { reason, message } => Some((*reason, message.clone())),
            _ => None,
        })
        .collect()
}

/// Start, bind, ring, answer, drop
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_incoming_call_full_lifecycle() {
    let mut harness = CallHarness::new(StaticPermissions::all_granted());
    let snapshot = harness.ring().await;
    let summary = snapshot.connection.expect("connection tracked");
    assert_eq!(summary.direction.to_string(), "incoming");
    assert_eq!(harness.telephony.register_count(), 1);

    harness.handle.answer();
    let snapshot = harness.handle.snapshot().await.expect("coordinator alive");
    assert_eq!(
        snapshot.connection.map(|c| c.state),
        Some(ConnectionState::Active)
    );

    harness.handle.drop_call();
    let snapshot = harness.handle.snapshot().await.expect("coordinator alive");
    assert!(snapshot.connection.is_none());
    assert_eq!(
        harness.labels(),
        vec!["Ringing", "Active", "Disconnected", "Destroyed", "No call"]
    );

    let peer = harness.telephony.last_connection().expect("peer created");
    assert_eq!(peer.state(), ConnectionState::Destroyed);
    assert_eq!(peer.disconnect_cause(), Some(DisconnectCause::LocalCancel));
}

/// Repeated drop with nothing to drop changes nothing and reports nothing
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_is_idempotent() {
    let mut harness = CallHarness::new(StaticPermissions::all_granted());
    harness.bind().await;

    harness.handle.drop_call();
    let first = harness.handle.snapshot().await.expect("coordinator alive");
    harness.handle.drop_call();
    let second = harness.handle.snapshot().await.expect("coordinator alive");

    assert_eq!(first, second);
    assert!(second.connection.is_none());
    assert!(harness.drain().is_empty());
}

/// Requests while a connection exists never create a second one
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_request_yields_busy() {
    let mut harness = CallHarness::new(StaticPermissions::all_granted());
    let snapshot = harness.ring().await;
    let live = snapshot.connection.expect("connection tracked").id;
    harness.drain();

    for _ in 0..3 {
        harness.handle.request_outgoing();
        harness.handle.request_incoming();
    }
    let snapshot = harness.handle.snapshot().await.expect("coordinator alive");
    assert_eq!(snapshot.connection.map(|c| c.id), Some(live));
    assert_eq!(harness.telephony.connections().len(), 1);

    let events = harness.drain();
    let busy = rejections(&events);
    assert_eq!(busy.len(), 6);
    for (reason, message) in busy {
        assert_eq!(reason, RejectionReason::ConnectionBusy);
        assert_eq!(message, CallError::ConnectionBusy.message());
    }
}

/// A missing permission is reported and prompted for, and no call is placed
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_permission_blocks_outgoing_call() {
    let mut harness = CallHarness::new(StaticPermissions::granting(&[
        Permission::ReadPhoneState,
    ]));
    harness.bind().await;

    harness.handle.request_outgoing();
    let snapshot = harness.handle.snapshot().await.expect("coordinator alive");
    assert!(snapshot.connection.is_none());
    assert!(harness.telephony.connections().is_empty());

    let events = harness.drain();
    let reported = rejections(&events);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, RejectionReason::PermissionRequired);
    assert!(reported[0].1.contains(Permission::ReadCallLog.android_name()));
    assert_eq!(
        harness.permissions.requests(),
        vec![(vec![Permission::ReadCallLog], 22)]
    );

    // Granting afterwards lets the next request through.
    harness.permissions.grant(Permission::ReadCallLog);
    harness.handle.request_outgoing();
    harness.wait_for(|s| s.connection.is_some()).await;
}

/// Stop during an active call disconnects locally before unbinding
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_during_active_call() {
    let mut harness = CallHarness::new(StaticPermissions::all_granted());
    harness.ring().await;
    harness.handle.answer();
    harness.handle.stop();

    let snapshot = harness.handle.snapshot().await.expect("coordinator alive");
    assert!(snapshot.connection.is_none());
    assert_eq!(snapshot.binding, BindingState::Unbound);
    assert!(!harness.telephony.has_listener());
    assert_eq!(harness.telephony.unbind_count(), 1);

    let peer = harness.telephony.last_connection().expect("peer created");
    assert_eq!(
        peer.calls(),
        vec![
            PeerCall::SetActive,
            PeerCall::SetDisconnected(DisconnectCause::LocalCancel),
            PeerCall::Destroy,
        ]
    );
    let labels = harness.labels();
    assert_eq!(
        labels,
        vec!["Ringing", "Active", "Disconnected", "Destroyed", "No call"]
    );

    // Nothing reaches the UI from the retired listener.
    harness.telephony.remote_hangup(peer.id());
    harness.telephony.fail(peer.id(), "late failure");
    harness.handle.snapshot().await.expect("coordinator alive");
    assert!(harness.labels().is_empty());
}
