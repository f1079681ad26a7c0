use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::messages::{CoordinatorMsg, CoordinatorSnapshot, LifecycleSignal, UiCommand};
use crate::telemetry::TelemetryCollector;

/// Cloneable entry point into the coordinator's context.
///
/// Every method only enqueues a message, so it is safe to call from any
/// thread. Methods return false once the coordinator has shut down.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
    telemetry: Arc<TelemetryCollector>,
}

impl CoordinatorHandle {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<CoordinatorMsg>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        Self { tx, telemetry }
    }

    fn send(&self, msg: CoordinatorMsg) -> bool {
        self.tx.send(msg).is_ok()
    }

    #[cfg(test)]
    pub(super) fn inject(&self, msg: CoordinatorMsg) -> bool {
        self.send(msg)
    }

    pub fn lifecycle(&self, signal: LifecycleSignal) -> bool {
        self.send(CoordinatorMsg::Lifecycle(signal))
    }

    pub fn command(&self, command: UiCommand) -> bool {
        self.send(CoordinatorMsg::Command(command))
    }

    pub fn foreground(&self) -> bool {
        self.lifecycle(LifecycleSignal::Foreground)
    }

    pub fn background(&self) -> bool {
        self.lifecycle(LifecycleSignal::Background)
    }

    pub fn start(&self) -> bool {
        self.lifecycle(LifecycleSignal::Start)
    }

    pub fn stop(&self) -> bool {
        self.lifecycle(LifecycleSignal::Stop)
    }

    pub fn answer(&self) -> bool {
        self.command(UiCommand::Answer)
    }

    pub fn drop_call(&self) -> bool {
        self.command(UiCommand::Drop)
    }

    pub fn request_incoming(&self) -> bool {
        self.command(UiCommand::RequestIncoming)
    }

    pub fn request_outgoing(&self) -> bool {
        self.command(UiCommand::RequestOutgoing)
    }

    pub fn tone_pressed(&self) -> bool {
        self.command(UiCommand::TonePressed)
    }

    pub fn tone_released(&self) -> bool {
        self.command(UiCommand::ToneReleased)
    }

    pub fn set_channel_count(&self, count: u8) -> bool {
        self.command(UiCommand::SetChannelCount(count))
    }

    pub fn set_buffer_size(&self, bursts: u32) -> bool {
        self.command(UiCommand::SetBufferSize(bursts))
    }

    pub fn set_audio_api(&self, id: u8) -> bool {
        self.command(UiCommand::SetAudioApi(id))
    }

    pub fn set_output_device(&self, id: i32) -> bool {
        self.command(UiCommand::SetOutputDevice(id))
    }

    /// State after every message enqueued before this call has been handled.
    pub async fn snapshot(&self) -> Option<CoordinatorSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(CoordinatorMsg::Snapshot(reply)) {
            return None;
        }
        rx.await.ok()
    }

    /// Tear everything down and stop the context. Returns false if it had
    /// already stopped.
    pub async fn shutdown(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(CoordinatorMsg::Shutdown(reply)) {
            return false;
        }
        rx.await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }
}
