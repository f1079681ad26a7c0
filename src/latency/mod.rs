//! Periodic output-latency sampling.
//!
//! A `LatencyPoller` samples the session's [`LatencyProbe`] on a tokio
//! interval and hands each reading to a delivery closure, which forwards it
//! to the coordinator's context. Every sample carries the poller's
//! generation and a per-poller sequence number; the coordinator publishes a
//! sample only if its generation is still live and its sequence is newer than
//! the last one shown. Cancelling stops the timer, and retiring the
//! generation on the context guarantees nothing in flight gets through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::{LatencyProbe, LatencyReading};

/// Default sampling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Shown instead of a number when the platform cannot measure latency.
pub const LATENCY_UNSUPPORTED_TEXT: &str = "Only supported in AAudio (API 26+)";

/// One reading tagged for on-context filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub generation: u64,
    pub sequence: u64,
    pub reading: LatencyReading,
}

/// Presentation text for a reading. `None` for `Inactive`, which is never
/// shown.
pub fn format_latency(reading: &LatencyReading) -> Option<String> {
    match reading {
        LatencyReading::Millis(millis) => Some(format!("{:.2}ms", millis)),
        LatencyReading::Unknown => Some("Unknown".to_string()),
        LatencyReading::Unsupported => Some(LATENCY_UNSUPPORTED_TEXT.to_string()),
        LatencyReading::Inactive => None,
    }
}

pub struct LatencyPoller {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LatencyPoller {
    /// Spawn the sampling task. The first sample is taken immediately.
    ///
    /// `deliver` returns false once the receiving side is gone, which ends
    /// the task. Must be called inside a tokio runtime.
    pub fn start<F>(generation: u64, interval: Duration, probe: LatencyProbe, deliver: F) -> Self
    where
        F: Fn(LatencySample) -> bool + Send + Sync + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence = 0u64;

            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }

                // Native latency queries may block; keep them off the runtime.
                let sampler = probe.clone();
                let reading = match tokio::task::spawn_blocking(move || sampler.sample()).await {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("[LatencyPoller] Sampling task failed: {}", e);
                        break;
                    }
                };

                if reading == LatencyReading::Inactive || flag.load(Ordering::Acquire) {
                    continue;
                }

                sequence += 1;
                if !deliver(LatencySample {
                    generation,
                    sequence,
                    reading,
                }) {
                    debug!("[LatencyPoller] Receiver gone, stopping generation {}", generation);
                    break;
                }
            }
        });

        info!(
            "[LatencyPoller] Started generation {} ({} ms)",
            generation,
            period.as_millis()
        );
        Self {
            generation,
            cancelled,
            task: Some(task),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop sampling. Idempotent.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            info!("[LatencyPoller] Cancelled generation {}", self.generation);
        }
    }
}

impl Drop for LatencyPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}
