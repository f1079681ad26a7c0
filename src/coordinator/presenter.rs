//! Presentation callbacks.
//!
//! The coordinator reports everything the UI shows through a [`Presenter`].
//! Callbacks run on the coordinator's context and must not block.
//! [`BroadcastPresenter`] turns them into a subscribable [`UiEvent`] stream
//! for hosts that render asynchronously (and for the CLI).

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;

use crate::audio::StreamConfig;
use crate::error::RejectionReason;

/// Call state label shown once a connection is gone.
pub const NO_CALL_LABEL: &str = "No call";

pub trait Presenter: Send + Sync {
    fn on_latency_updated(&self, text: &str);

    fn on_call_state_changed(&self, label: &str);

    fn on_command_rejected(&self, reason: RejectionReason, message: &str);

    /// Selectors were reset to `defaults` on foreground.
    fn on_selectors_reset(&self, _defaults: &StreamConfig) {}
}

/// Presenter callbacks as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    LatencyUpdated {
        text: String,
    },
    CallStateChanged {
        label: String,
    },
    CommandRejected {
        reason: RejectionReason,
        message: String,
    },
    SelectorsReset {
        defaults: StreamConfig,
    },
}

/// Presenter backed by a tokio broadcast channel.
///
/// Multiple subscribers each receive every event. A subscriber that falls
/// more than `capacity` events behind loses the oldest ones.
#[derive(Clone)]
pub struct BroadcastPresenter {
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastPresenter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Forward the broadcast into an unbounded channel. Must be called
    /// inside a tokio runtime.
    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<UiEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[BroadcastPresenter] Subscriber lagged, {} events lost", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }

    /// Event stream for async consumers. Lagged gaps are skipped silently.
    pub fn stream(&self) -> impl Stream<Item = UiEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine; the UI may not be attached yet.
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastPresenter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Presenter for BroadcastPresenter {
    fn on_latency_updated(&self, text: &str) {
        self.emit(UiEvent::LatencyUpdated {
            text: text.to_string(),
        });
    }

    fn on_call_state_changed(&self, label: &str) {
        self.emit(UiEvent::CallStateChanged {
            label: label.to_string(),
        });
    }

    fn on_command_rejected(&self, reason: RejectionReason, message: &str) {
        self.emit(UiEvent::CommandRejected {
            reason,
            message: message.to_string(),
        });
    }

    fn on_selectors_reset(&self, defaults: &StreamConfig) {
        self.emit(UiEvent::SelectorsReset {
            defaults: *defaults,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_every_subscriber() {
        let presenter = BroadcastPresenter::new(8);
        let mut a = presenter.subscribe();
        let mut b = presenter.subscribe();

        presenter.on_call_state_changed("Ringing");
        presenter.on_command_rejected(RejectionReason::NoActiveCall, "There is no call");

        for rx in [&mut a, &mut b] {
            assert_eq!(
                rx.try_recv().unwrap(),
                UiEvent::CallStateChanged {
                    label: "Ringing".to_string()
                }
            );
            assert!(matches!(
                rx.try_recv().unwrap(),
                UiEvent::CommandRejected {
                    reason: RejectionReason::NoActiveCall,
                    ..
                }
            ));
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let presenter = BroadcastPresenter::default();
        presenter.on_latency_updated("1.00ms");
    }

    #[tokio::test]
    async fn stream_yields_events_in_order() {
        let presenter = BroadcastPresenter::new(8);
        let stream = presenter.stream();

        presenter.on_call_state_changed("Dialing");
        presenter.on_call_state_changed("Active");
        drop(presenter);

        let labels: Vec<UiEvent> = stream.collect().await;
        assert_eq!(
            labels,
            vec![
                UiEvent::CallStateChanged {
                    label: "Dialing".to_string()
                },
                UiEvent::CallStateChanged {
                    label: "Active".to_string()
                },
            ]
        );
    }

    #[test]
    fn ui_event_json_shape() {
        let json = serde_json::to_string(&UiEvent::LatencyUpdated {
            text: "Unknown".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"latency_updated","text":"Unknown"}"#);
    }
}
