//! Messages accepted by the coordinator's serialized context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::audio::StreamConfig;
use crate::latency::LatencySample;
use crate::telephony::{
    BindingState, CallDirection, CallService, ConnectionId, ConnectionState, ServiceEvent,
    TelephonyFault,
};

/// App lifecycle transitions, delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    Foreground,
    Background,
    Start,
    Stop,
}

/// User gestures and selector changes.
///
/// Selector values arrive raw, as the widget reports them, and are
/// validated on the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum UiCommand {
    Answer,
    Drop,
    RequestIncoming,
    RequestOutgoing,
    TonePressed,
    ToneReleased,
    SetChannelCount(u8),
    SetBufferSize(u32),
    SetAudioApi(u8),
    SetOutputDevice(i32),
}

/// Outcome of the registration plus add-call sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRequestOutcome {
    Placed,
    NotRegistered,
    RegistrationFault(TelephonyFault),
    AddCallFault(TelephonyFault),
}

pub(crate) enum CoordinatorMsg {
    Lifecycle(LifecycleSignal),
    Command(UiCommand),
    LatencySample(LatencySample),
    BindCompleted {
        epoch: u64,
        result: Result<Arc<dyn CallService>, TelephonyFault>,
    },
    Service {
        epoch: u64,
        event: ServiceEvent,
    },
    CallRequestCompleted {
        epoch: u64,
        direction: CallDirection,
        outcome: CallRequestOutcome,
    },
    Snapshot(oneshot::Sender<CoordinatorSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub engine_active: bool,
    pub stream: StreamConfig,
    pub tone_on: bool,
    pub poller_generation: Option<u64>,
    pub binding: BindingState,
    pub binding_epoch: u64,
    pub connection: Option<ConnectionSummary>,
    pub call_request_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub direction: CallDirection,
    pub state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_command_json_shape() {
        let json = serde_json::to_string(&UiCommand::SetChannelCount(4)).unwrap();
        assert_eq!(json, r#"{"command":"set_channel_count","value":4}"#);
        let parsed: UiCommand = serde_json::from_str(r#"{"command":"answer"}"#).unwrap();
        assert_eq!(parsed, UiCommand::Answer);
    }
}
