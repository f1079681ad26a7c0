//! Coordinator telemetry collector and helpers.
//!
//! The collector records engine, binding, call and poller lifecycle events
//! into a bounded history plus an async broadcast stream. Latency samples
//! feed a rolling window whose aggregate is published alongside.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};

pub mod events;

pub use events::{TelemetryEvent, TelemetryEventKind};

/// Trait representing a monotonic time source used for telemetry timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests and CLI runs.
///
/// Each call to `now()` advances by a fixed 10ms so timestamps are
/// reproducible across runs.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(10, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

/// Aggregate over the rolling latency window.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub max_ms: f64,
    pub sample_count: usize,
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<TelemetryEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
    pub latency: LatencyStats,
}

/// Latency tracker maintains a rolling window to compute avg/max latency.
struct LatencyTracker {
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value: f64) -> LatencyStats {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.stats()
    }

    fn stats(&self) -> LatencyStats {
        let count = self.samples.len();
        if count == 0 {
            return LatencyStats::default();
        }
        let sum: f64 = self.samples.iter().sum();
        let max = self.samples.iter().copied().fold(0.0_f64, f64::max);
        LatencyStats {
            avg_ms: sum / count as f64,
            max_ms: max,
            sample_count: count,
        }
    }
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<TelemetryEvent>,
    history: Mutex<VecDeque<TelemetryEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
    latency: Mutex<LatencyTracker>,
    time_source: Arc<dyn TimeSource>,
    start: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TelemetryCollector {
    pub fn new(
        buffer: usize,
        history_capacity: usize,
        latency_window: usize,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        let start = time_source.now();
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
            latency: Mutex::new(LatencyTracker::new(latency_window)),
            time_source,
            start,
        }
    }

    /// Stamp and publish an event.
    pub fn record(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self
            .time_source
            .now()
            .saturating_duration_since(self.start)
            .as_millis() as u64;
        self.publish(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    /// Feed one measured latency into the rolling window.
    pub fn record_latency(&self, millis: f64) {
        let stats = lock(&self.latency).observe(millis);
        self.record(
            TelemetryEventKind::LatencySampled {
                avg_ms: stats.avg_ms,
                max_ms: stats.max_ms,
                sample_count: stats.sample_count,
            },
            None,
        );
    }

    pub fn publish(&self, event: TelemetryEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    /// Forward the broadcast into an unbounded channel. Must be called
    /// inside a tokio runtime.
    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<TelemetryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            while let Ok(event) = broadcast_rx.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        rx
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = lock(&self.history).iter().cloned().collect();
        TelemetrySnapshot {
            recent,
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
            latency: lock(&self.latency).stats(),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64, 32, Arc::new(SystemTimeSource::default()))
    }
}
