//! Integration tests for the coordinator's audio lifecycle
//!
//! These tests drive the public handle with the desktop stub backend and
//! cover:
//! - Foreground/Background ordering and create/destroy pairing
//! - Latency publishing and its cancellation
//! - The fixed text shown when latency detection is unsupported
//! - Selector changes while active and while inactive

use std::sync::Arc;
use std::time::Duration;

use hello_oboe::engine::DesktopStubBackend;
use hello_oboe::latency::LATENCY_UNSUPPORTED_TEXT;
use hello_oboe::telemetry::StubTimeSource;
use hello_oboe::telephony::simulated::SimulatedTelephony;
use hello_oboe::telephony::StaticPermissions;
use hello_oboe::{
    AppConfig, BroadcastPresenter, Coordinator, CoordinatorHandle, CoordinatorParts,
    LifecycleSignal, PlaybackBackend, RejectionReason, UiEvent,
};
use tokio::sync::broadcast;

fn init_test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}

fn spawn_coordinator(
    interval_ms: u64,
) -> (
    CoordinatorHandle,
    Arc<DesktopStubBackend>,
    broadcast::Receiver<UiEvent>,
) {
    let mut config = AppConfig::default();
    config.latency.interval_ms = interval_ms;
    let backend = Arc::new(DesktopStubBackend::new());
    let presenter = BroadcastPresenter::new(4096);
    let events = presenter.subscribe();
    let telephony = SimulatedTelephony::new();

    let handle = Coordinator::spawn(CoordinatorParts {
        config,
        backend: backend.clone(),
        connector: telephony.connector(),
        permissions: Arc::new(StaticPermissions::all_granted()),
        presenter: Arc::new(presenter),
        time_source: Arc::new(StubTimeSource::new()),
    });
    (handle, backend, events)
}

fn drain(events: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn latency_texts(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::LatencyUpdated { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Engine activity tracks the most recent signal, and creates never overlap
#[test]
fn test_engine_active_iff_last_signal_was_foreground() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, backend, _events) = spawn_coordinator(60_000);
        let sequences: [&[LifecycleSignal]; 4] = [
            &[LifecycleSignal::Foreground],
            &[LifecycleSignal::Foreground, LifecycleSignal::Foreground],
            &[
                LifecycleSignal::Background,
                LifecycleSignal::Foreground,
                LifecycleSignal::Background,
            ],
            &[LifecycleSignal::Background, LifecycleSignal::Foreground],
        ];

        for sequence in sequences {
            for signal in sequence {
                assert!(handle.lifecycle(*signal));
            }
            let expected = sequence.last() == Some(&LifecycleSignal::Foreground);
            let snapshot = handle.snapshot().await.expect("coordinator alive");
            assert_eq!(snapshot.engine_active, expected);
            assert_eq!(backend.is_open(), expected);
            assert_eq!(snapshot.poller_generation.is_some(), expected);
        }

        assert_eq!(backend.max_outstanding(), 1);
        assert!(handle.shutdown().await);
        assert!(!backend.is_open());
    });
}

/// No latency is published once Background has been handled
#[test]
fn test_no_latency_updates_after_background() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, backend, mut events) = spawn_coordinator(5);
        backend.set_latency_millis(7.5);

        handle.foreground();
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.background();
        handle.snapshot().await.expect("coordinator alive");

        let before = latency_texts(&drain(&mut events));
        assert!(!before.is_empty(), "expected latency while active");
        assert!(before.iter().all(|text| text == "7.50ms"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.snapshot().await.expect("coordinator alive");
        assert!(latency_texts(&drain(&mut events)).is_empty());
    });
}

/// Unsupported latency detection never shows a number
#[test]
fn test_unsupported_latency_reports_fixed_text() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, backend, mut events) = spawn_coordinator(5);
        backend.set_latency_supported(false);

        handle.foreground();
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.snapshot().await.expect("coordinator alive");

        let texts = latency_texts(&drain(&mut events));
        assert!(!texts.is_empty());
        for text in texts {
            assert_eq!(text, LATENCY_UNSUPPORTED_TEXT);
            assert!(!text.ends_with("ms"));
        }
    });
}

/// Selector changes reconfigure the open stream in place
#[test]
fn test_selector_changes_while_active() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, backend, mut events) = spawn_coordinator(60_000);
        handle.foreground();
        handle.set_channel_count(1);
        handle.set_buffer_size(8);
        handle.set_output_device(3);
        handle.set_channel_count(0);

        let snapshot = handle.snapshot().await.expect("coordinator alive");
        assert_eq!(snapshot.stream.channel_count.get(), 1);
        assert_eq!(snapshot.stream.buffer_size.bursts(), 8);
        assert_eq!(snapshot.stream.output_device.id(), 3);
        assert_eq!(backend.current_config(), Some(snapshot.stream));
        assert_eq!(backend.reconfigure_count(), 3);
        assert_eq!(backend.open_count(), 1);

        let rejections: Vec<RejectionReason> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::CommandRejected { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(rejections, vec![RejectionReason::InvalidConfiguration]);
    });
}

/// Engine that cannot open reports once and stays inactive
#[test]
fn test_unavailable_engine_is_rejected() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, backend, mut events) = spawn_coordinator(60_000);
        backend.set_unavailable(true);
        handle.foreground();

        let snapshot = handle.snapshot().await.expect("coordinator alive");
        assert!(!snapshot.engine_active);
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            UiEvent::CommandRejected {
                reason: RejectionReason::EngineUnavailable,
                ..
            }
        )));

        backend.set_unavailable(false);
        handle.foreground();
        assert!(handle.snapshot().await.expect("coordinator alive").engine_active);
    });
}

/// Telemetry records the engine and poller lifecycle
#[test]
fn test_telemetry_tracks_lifecycle() {
    let runtime = init_test_runtime();
    runtime.block_on(async {
        let (handle, _backend, _events) = spawn_coordinator(60_000);
        let telemetry = handle.telemetry();

        handle.foreground();
        handle.background();
        handle.snapshot().await.expect("coordinator alive");

        let snapshot = telemetry.snapshot();
        let kinds: Vec<String> = snapshot
            .recent
            .iter()
            .map(|event| {
                let value = serde_json::to_value(&event.kind).unwrap();
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "engine_created",
                "poller_started",
                "poller_cancelled",
                "engine_destroyed"
            ]
        );
    });
}
