//! Telemetry event types published by the coordinator.

use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;
use crate::telephony::ConnectionState;

/// What happened. Carries only the data needed to reconstruct a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TelemetryEventKind {
    EngineCreated,
    EngineDestroyed,
    EngineUnavailable,
    PollerStarted { generation: u64 },
    PollerCancelled { generation: u64 },
    LatencySampled {
        avg_ms: f64,
        max_ms: f64,
        sample_count: usize,
    },
    ServiceBound { epoch: u64 },
    ServiceUnbound { epoch: u64 },
    BindFailed,
    CallStateChanged { state: ConnectionState },
    CommandRejected { reason: RejectionReason },
}

/// A timestamped telemetry event. Timestamps are milliseconds since the
/// collector was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}
