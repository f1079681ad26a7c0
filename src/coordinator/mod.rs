//! Coordinator - the serialized context gluing lifecycle, audio and calls
//!
//! One tokio task owns the audio session, the latency poller, the service
//! binding and the current call connection. Everything else (UI commands,
//! lifecycle signals, poller samples, bind and call-request completions,
//! telephony events from arbitrary threads) reaches it as a message on a
//! single unbounded channel, so no state is ever mutated off the context.
//!
//! # Cancellation
//! - Poller samples carry a generation; only the live generation publishes,
//!   and only in tick order.
//! - Bind completions, call-request completions and service events carry the
//!   binding epoch; anything from a retired epoch is dropped (a stale bound
//!   service is released, a stale offered peer is disconnected).
//!
//! Spawned tasks hold weak senders, so the loop ends once every
//! [`CoordinatorHandle`] is dropped. Teardown then runs the same path as
//! `Background` followed by `Stop`.

mod handle;
mod messages;
mod presenter;


use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::audio::{
    AudioApi, AudioEngineSession, BufferSizeOption, ChannelCount, LatencyReading, OutputDevice,
};
use crate::config::AppConfig;
use crate::engine::PlaybackBackend;
use crate::error::{
    log_audio_error, log_call_error, AudioError, CallError, ErrorCode, RejectionReason,
};
use crate::latency::{format_latency, LatencyPoller, LatencySample};
use crate::telemetry::{TelemetryCollector, TelemetryEventKind, TimeSource};
use crate::telephony::{
    CallConnection, CallDirection, CallServiceBinding, CallServiceConnector, ConnectionListener,
    ConnectionPeer, DisconnectCause, PermissionState, RemoteChange, ServiceEvent,
    ServiceEventSink,
};

pub use handle::CoordinatorHandle;
pub use messages::{
    CallRequestOutcome, ConnectionSummary, CoordinatorSnapshot, LifecycleSignal, UiCommand,
};
pub use presenter::{BroadcastPresenter, Presenter, UiEvent, NO_CALL_LABEL};

use messages::CoordinatorMsg;

/// Collaborators the coordinator is built from.
pub struct CoordinatorParts {
    pub config: AppConfig,
    pub backend: Arc<dyn PlaybackBackend>,
    pub connector: Arc<dyn CallServiceConnector>,
    pub permissions: Arc<dyn PermissionState>,
    pub presenter: Arc<dyn Presenter>,
    pub time_source: Arc<dyn TimeSource>,
}

pub struct Coordinator {
    config: AppConfig,
    session: AudioEngineSession,
    poller: Option<LatencyPoller>,
    next_generation: u64,
    last_sequence: u64,
    binding: CallServiceBinding,
    connection: Option<CallConnection>,
    call_request: Option<CallDirection>,
    permissions: Arc<dyn PermissionState>,
    presenter: Arc<dyn Presenter>,
    telemetry: Arc<TelemetryCollector>,
    tx: mpsc::WeakUnboundedSender<CoordinatorMsg>,
}

impl Coordinator {
    /// Start the coordinator task. Must be called inside a tokio runtime.
    pub fn spawn(parts: CoordinatorParts) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let telemetry_config = &parts.config.telemetry;
        let telemetry = Arc::new(TelemetryCollector::new(
            telemetry_config.channel_capacity,
            telemetry_config.history_capacity,
            telemetry_config.latency_window,
            parts.time_source,
        ));

        let coordinator = Coordinator {
            session: AudioEngineSession::new(parts.backend, parts.config.audio.stream),
            config: parts.config,
            poller: None,
            next_generation: 0,
            last_sequence: 0,
            binding: CallServiceBinding::new(parts.connector),
            connection: None,
            call_request: None,
            permissions: parts.permissions,
            presenter: parts.presenter,
            telemetry: Arc::clone(&telemetry),
            tx: tx.downgrade(),
        };

        tokio::spawn(coordinator.run(rx).instrument(tracing::info_span!("coordinator")));
        CoordinatorHandle::new(tx, telemetry)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordinatorMsg>) {
        info!("[Coordinator] Started");
        while let Some(msg) = rx.recv().await {
            if let CoordinatorMsg::Shutdown(reply) = msg {
                rx.close();
                self.teardown();
                let _ = reply.send(());
                return;
            }
            self.handle(msg);
        }
        self.teardown();
    }

    fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::Lifecycle(signal) => self.on_lifecycle(signal),
            CoordinatorMsg::Command(command) => self.on_command(command),
            CoordinatorMsg::LatencySample(sample) => self.on_latency_sample(sample),
            CoordinatorMsg::BindCompleted { epoch, result } => {
                let weak = self.tx.clone();
                match self
                    .binding
                    .complete_bind(epoch, result, |epoch| service_sink(weak, epoch))
                {
                    Ok(true) => {
                        self.telemetry
                            .record(TelemetryEventKind::ServiceBound { epoch }, None);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        self.telemetry.record(TelemetryEventKind::BindFailed, None);
                        self.reject_call(err, "bind");
                    }
                }
            }
            CoordinatorMsg::Service { epoch, event } => self.on_service_event(epoch, event),
            CoordinatorMsg::CallRequestCompleted {
                epoch,
                direction,
                outcome,
            } => self.on_call_request_completed(epoch, direction, outcome),
            CoordinatorMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop.
            CoordinatorMsg::Shutdown(_) => {}
        }
    }

    fn on_lifecycle(&mut self, signal: LifecycleSignal) {
        debug!("[Coordinator] Lifecycle {:?}", signal);
        match signal {
            LifecycleSignal::Foreground => self.on_foreground(),
            LifecycleSignal::Background => self.on_background(),
            LifecycleSignal::Start => self.on_start(),
            LifecycleSignal::Stop => self.on_stop(),
        }
    }

    // ========================================================================
    // AUDIO SESSION + POLLER
    // ========================================================================

    fn on_foreground(&mut self) {
        if self.session.is_active() {
            debug!("[Coordinator] Foreground while active, ignoring");
            return;
        }

        if self.config.audio.reset_selectors_on_foreground {
            let defaults = self.config.audio.stream;
            // Inactive, so this only replaces the buffered values.
            if let Err(err) = self.session.set_config(defaults) {
                self.reject_audio(err, "reset selectors");
            }
            self.presenter.on_selectors_reset(&defaults);
        }

        match self.session.create() {
            Ok(()) => {
                self.telemetry
                    .record(TelemetryEventKind::EngineCreated, None);
                self.start_poller();
            }
            Err(err) => {
                self.telemetry.record(
                    TelemetryEventKind::EngineUnavailable,
                    Some(err.message()),
                );
                self.reject_audio(err, "create engine");
            }
        }
    }

    fn on_background(&mut self) {
        self.cancel_poller();
        if self.session.is_active() {
            self.session.destroy();
            self.telemetry
                .record(TelemetryEventKind::EngineDestroyed, None);
        }
    }

    fn start_poller(&mut self) {
        self.cancel_poller();
        self.next_generation += 1;
        self.last_sequence = 0;
        let generation = self.next_generation;

        let weak = self.tx.clone();
        let poller = LatencyPoller::start(
            generation,
            self.config.latency.interval(),
            self.session.probe(),
            move |sample| match weak.upgrade() {
                Some(tx) => tx.send(CoordinatorMsg::LatencySample(sample)).is_ok(),
                None => false,
            },
        );
        self.poller = Some(poller);
        self.telemetry
            .record(TelemetryEventKind::PollerStarted { generation }, None);
    }

    fn cancel_poller(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
            self.telemetry.record(
                TelemetryEventKind::PollerCancelled {
                    generation: poller.generation(),
                },
                None,
            );
        }
    }

    fn on_latency_sample(&mut self, sample: LatencySample) {
        let live = self.poller.as_ref().map(|poller| poller.generation());
        if live != Some(sample.generation) {
            debug!(
                "[Coordinator] Dropping sample from retired generation {}",
                sample.generation
            );
            return;
        }
        if sample.sequence <= self.last_sequence || !self.session.is_active() {
            return;
        }
        self.last_sequence = sample.sequence;

        let Some(text) = format_latency(&sample.reading) else {
            return;
        };
        if let LatencyReading::Millis(millis) = sample.reading {
            self.telemetry.record_latency(millis);
        }
        self.presenter.on_latency_updated(&text);
    }

    // ========================================================================
    // SERVICE BINDING
    // ========================================================================

    fn on_start(&mut self) {
        let Some(pending) = self.binding.bind() else {
            return;
        };
        let weak = self.tx.clone();
        tokio::spawn(async move {
            let (epoch, result) = pending.resolve().await;
            match weak.upgrade() {
                Some(tx) => {
                    let _ = tx.send(CoordinatorMsg::BindCompleted { epoch, result });
                }
                None => {
                    // Nobody left to own the binding.
                    if let Ok(service) = result {
                        service.unbind();
                    }
                }
            }
        });
    }

    fn on_stop(&mut self) {
        self.close_connection(DisconnectCause::LocalCancel);
        self.call_request = None;
        if self.binding.unbind(&mut self.connection) {
            self.telemetry.record(
                TelemetryEventKind::ServiceUnbound {
                    epoch: self.binding.epoch(),
                },
                None,
            );
        }
    }

    fn on_service_event(&mut self, epoch: u64, event: ServiceEvent) {
        if !self.binding.is_current(epoch) {
            debug!("[Coordinator] Dropping stale service event {:?}", event);
            if let ServiceEvent::ConnectionOffered(peer) = event {
                release_peer(peer.as_ref());
            }
            return;
        }

        match event {
            ServiceEvent::ConnectionOffered(peer) => self.on_connection_offered(peer),
            ServiceEvent::StateChanged { id, change } => {
                let Some(connection) = self.connection.as_mut() else {
                    debug!("[Coordinator] {:?} for {} with no connection", change, id);
                    return;
                };
                if connection.id() != id {
                    debug!("[Coordinator] {:?} for unknown connection {}", change, id);
                    return;
                }
                match change {
                    RemoteChange::Accepted => {
                        if let Err(err) = connection.remote_accepted() {
                            log_call_error(&err, "remote accept");
                        }
                    }
                    RemoteChange::HungUp => {
                        self.finish_remote_close(DisconnectCause::RemoteHangup);
                    }
                    RemoteChange::Failed { message } => {
                        warn!("[Coordinator] Connection {} failed: {}", id, message);
                        self.finish_remote_close(DisconnectCause::Error);
                    }
                }
            }
            ServiceEvent::ServiceDisconnected => {
                warn!("[Coordinator] Telephony service disconnected");
                self.on_stop();
            }
        }
    }

    fn on_connection_offered(&mut self, peer: Arc<dyn ConnectionPeer>) {
        if let Some(current) = &self.connection {
            warn!(
                "[Coordinator] Rejecting offered {} while {} is live",
                peer.id(),
                current.id()
            );
            release_peer(peer.as_ref());
            return;
        }

        let mut connection = CallConnection::offered(peer, self.connection_listener());
        match connection.begin() {
            Ok(state) => {
                info!(
                    "[Coordinator] Tracking {} {} ({})",
                    connection.direction(),
                    connection.id(),
                    state
                );
                self.connection = Some(connection);
            }
            Err(err) => {
                log_call_error(&err, "begin connection");
                connection.close_locally(DisconnectCause::Error);
            }
        }
    }

    fn connection_listener(&self) -> ConnectionListener {
        let presenter = Arc::clone(&self.presenter);
        let telemetry = Arc::clone(&self.telemetry);
        Box::new(move |id, state| {
            telemetry.record(
                TelemetryEventKind::CallStateChanged { state },
                Some(id.to_string()),
            );
            presenter.on_call_state_changed(state.label());
        })
    }

    /// Close the live connection from this side. Returns false if there was none.
    fn close_connection(&mut self, cause: DisconnectCause) -> bool {
        match self.connection.take() {
            Some(connection) => {
                connection.close_locally(cause);
                self.presenter.on_call_state_changed(NO_CALL_LABEL);
                true
            }
            None => false,
        }
    }

    fn finish_remote_close(&mut self, cause: DisconnectCause) {
        if let Some(connection) = self.connection.take() {
            connection.closed_remotely(cause);
            self.presenter.on_call_state_changed(NO_CALL_LABEL);
        }
    }

    // ========================================================================
    // UI COMMANDS
    // ========================================================================

    fn on_command(&mut self, command: UiCommand) {
        debug!("[Coordinator] Command {:?}", command);
        match command {
            UiCommand::Answer => match self.connection.as_mut() {
                None => self.reject_call(CallError::NoActiveCall, "answer"),
                Some(connection) => {
                    if let Err(err) = connection.answer() {
                        self.reject_call(err, "answer");
                    }
                }
            },
            UiCommand::Drop => {
                if !self.close_connection(DisconnectCause::LocalCancel) {
                    debug!("[Coordinator] Drop with no connection");
                }
            }
            UiCommand::RequestIncoming => self.request_call(CallDirection::Incoming),
            UiCommand::RequestOutgoing => self.request_call(CallDirection::Outgoing),
            UiCommand::TonePressed => self.session.set_tone_on(true),
            UiCommand::ToneReleased => self.session.set_tone_on(false),
            UiCommand::SetChannelCount(count) => {
                let result =
                    ChannelCount::new(count).and_then(|count| self.session.set_channel_count(count));
                self.audio_result(result, "set channel count");
            }
            UiCommand::SetBufferSize(bursts) => {
                let result = BufferSizeOption::from_bursts(bursts)
                    .and_then(|size| self.session.set_buffer_size_in_bursts(size));
                self.audio_result(result, "set buffer size");
            }
            UiCommand::SetAudioApi(id) => {
                let result =
                    AudioApi::from_id(id).and_then(|api| self.session.set_audio_api(api));
                self.audio_result(result, "set audio api");
            }
            UiCommand::SetOutputDevice(id) => {
                let result = OutputDevice::from_id(id)
                    .and_then(|device| self.session.set_output_device(device));
                self.audio_result(result, "set output device");
            }
        }
    }

    fn request_call(&mut self, direction: CallDirection) {
        let telephony = &self.config.telephony;
        let missing = self.permissions.missing(&telephony.required_permissions);
        if !missing.is_empty() {
            self.permissions
                .request(&missing, telephony.permission_request_code);
            self.reject_call(CallError::PermissionRequired { missing }, "request call");
            return;
        }

        if self.connection.is_some() || self.call_request.is_some() {
            self.reject_call(CallError::ConnectionBusy, "request call");
            return;
        }

        let service = match self.binding.service() {
            Some(service) if self.binding.is_bound() => service,
            _ => {
                self.reject_call(CallError::ServiceUnbound, "request call");
                return;
            }
        };

        self.call_request = Some(direction);
        let epoch = self.binding.epoch();
        let weak = self.tx.clone();
        tokio::spawn(async move {
            let outcome = match service.register_account().await {
                Ok(true) => {
                    let placed = match direction {
                        CallDirection::Incoming => service.add_incoming_call().await,
                        CallDirection::Outgoing => service.add_outgoing_call().await,
                    };
                    match placed {
                        Ok(()) => CallRequestOutcome::Placed,
                        Err(fault) => CallRequestOutcome::AddCallFault(fault),
                    }
                }
                Ok(false) => CallRequestOutcome::NotRegistered,
                Err(fault) => CallRequestOutcome::RegistrationFault(fault),
            };
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(CoordinatorMsg::CallRequestCompleted {
                    epoch,
                    direction,
                    outcome,
                });
            }
        });
    }

    fn on_call_request_completed(
        &mut self,
        epoch: u64,
        direction: CallDirection,
        outcome: CallRequestOutcome,
    ) {
        if epoch != self.binding.epoch() || self.call_request != Some(direction) {
            debug!(
                "[Coordinator] Ignoring stale {} call request result {:?}",
                direction, outcome
            );
            return;
        }
        self.call_request = None;

        let err = match outcome {
            CallRequestOutcome::Placed => {
                debug!("[Coordinator] {} call placed", direction);
                return;
            }
            CallRequestOutcome::NotRegistered => CallError::RegistrationFailed {
                reason: "account refused by the platform".to_string(),
            },
            CallRequestOutcome::RegistrationFault(fault) => CallError::RegistrationFailed {
                reason: fault.message,
            },
            CallRequestOutcome::AddCallFault(fault) => CallError::TelephonyFault {
                message: fault.message,
            },
        };
        self.reject_call(err, "call request");
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    fn audio_result(&self, result: Result<(), AudioError>, context: &str) {
        if let Err(err) = result {
            self.reject_audio(err, context);
        }
    }

    fn reject_audio(&self, err: AudioError, context: &str) {
        log_audio_error(&err, context);
        self.reject(err.reason(), err.message());
    }

    fn reject_call(&self, err: CallError, context: &str) {
        log_call_error(&err, context);
        self.reject(err.reason(), err.message());
    }

    fn reject(&self, reason: RejectionReason, message: String) {
        self.presenter.on_command_rejected(reason, &message);
        self.telemetry
            .record(TelemetryEventKind::CommandRejected { reason }, Some(message));
    }

    fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            engine_active: self.session.is_active(),
            stream: self.session.config(),
            tone_on: self.session.tone_on(),
            poller_generation: self.poller.as_ref().map(|poller| poller.generation()),
            binding: self.binding.state(),
            binding_epoch: self.binding.epoch(),
            connection: self.connection.as_ref().map(|connection| ConnectionSummary {
                id: connection.id(),
                direction: connection.direction(),
                state: connection.state(),
            }),
            call_request_pending: self.call_request.is_some(),
        }
    }

    fn teardown(&mut self) {
        self.on_background();
        self.on_stop();
        info!("[Coordinator] Stopped");
    }
}

/// Listener installed on a bound service. Tags every event with `epoch`.
fn service_sink(weak: mpsc::WeakUnboundedSender<CoordinatorMsg>, epoch: u64) -> ServiceEventSink {
    Arc::new(move |event| match weak.upgrade() {
        Some(tx) => {
            let _ = tx.send(CoordinatorMsg::Service { epoch, event });
        }
        None => {
            if let ServiceEvent::ConnectionOffered(peer) = event {
                release_peer(peer.as_ref());
            }
        }
    })
}

/// Refuse a peer that will never be tracked.
fn release_peer(peer: &dyn ConnectionPeer) {
    peer.set_disconnected(DisconnectCause::Error);
    peer.destroy();
}
