//! In-process telephony service.
//!
//! Stands in for the platform call service on desktop, in the CLI and in
//! tests. Outcomes of bind, registration and call requests are scripted, and
//! remote-side changes (accept, hangup, failure, service death) are injected
//! through [`SimulatedTelephony`]. Events are delivered synchronously on the
//! thread that triggers them, which is never the coordinator's context.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use super::{
    CallDirection, CallService, CallServiceConnector, ConnectionId, ConnectionPeer,
    ConnectionState, DisconnectCause, RemoteChange, ServiceEvent, ServiceEventSink,
    TelephonyFault,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Succeed,
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Refused,
    Fault(String),
}

/// Local operations recorded on a simulated peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCall {
    SetActive,
    SetDisconnected(DisconnectCause),
    Destroy,
}

struct PeerInner {
    state: ConnectionState,
    cause: Option<DisconnectCause>,
    calls: Vec<PeerCall>,
}

pub struct SimulatedConnection {
    id: ConnectionId,
    direction: CallDirection,
    inner: Mutex<PeerInner>,
}

impl SimulatedConnection {
    pub fn new(id: ConnectionId, direction: CallDirection) -> Self {
        Self {
            id,
            direction,
            inner: Mutex::new(PeerInner {
                state: ConnectionState::New,
                cause: None,
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PeerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.lock().calls.clone()
    }

    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        self.lock().cause
    }

    fn remote_update(&self, state: ConnectionState, cause: Option<DisconnectCause>) {
        let mut inner = self.lock();
        inner.state = state;
        if cause.is_some() {
            inner.cause = cause;
        }
    }
}

impl ConnectionPeer for SimulatedConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn direction(&self) -> CallDirection {
        self.direction
    }

    fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn set_active(&self) {
        let mut inner = self.lock();
        inner.state = ConnectionState::Active;
        inner.calls.push(PeerCall::SetActive);
    }

    fn set_disconnected(&self, cause: DisconnectCause) {
        let mut inner = self.lock();
        inner.state = ConnectionState::Disconnected;
        inner.cause = Some(cause);
        inner.calls.push(PeerCall::SetDisconnected(cause));
    }

    fn destroy(&self) {
        let mut inner = self.lock();
        inner.state = ConnectionState::Destroyed;
        inner.calls.push(PeerCall::Destroy);
    }
}

struct Shared {
    bind_outcome: BindOutcome,
    bind_delay: Duration,
    registration: RegistrationOutcome,
    add_call_fault: Option<String>,
    /// Listener slot, tagged with the id of the service that installed it.
    listener: Option<(u64, ServiceEventSink)>,
    next_service_id: u64,
    next_id: u64,
    connections: Vec<Arc<SimulatedConnection>>,
    bind_count: usize,
    unbind_count: usize,
    register_count: usize,
}

/// Scriptable telephony stack shared by the connector and its services.
#[derive(Clone)]
pub struct SimulatedTelephony {
    shared: Arc<Mutex<Shared>>,
}

impl Default for SimulatedTelephony {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTelephony {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                bind_outcome: BindOutcome::Succeed,
                bind_delay: Duration::ZERO,
                registration: RegistrationOutcome::Registered,
                add_call_fault: None,
                listener: None,
                next_service_id: 1,
                next_id: 1,
                connections: Vec::new(),
                bind_count: 0,
                unbind_count: 0,
                register_count: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connector(&self) -> Arc<dyn CallServiceConnector> {
        Arc::new(SimulatedConnector {
            telephony: self.clone(),
        })
    }

    pub fn set_bind_outcome(&self, outcome: BindOutcome) {
        self.lock().bind_outcome = outcome;
    }

    pub fn set_bind_delay(&self, delay: Duration) {
        self.lock().bind_delay = delay;
    }

    pub fn set_registration(&self, outcome: RegistrationOutcome) {
        self.lock().registration = outcome;
    }

    pub fn set_add_call_fault(&self, fault: Option<String>) {
        self.lock().add_call_fault = fault;
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }

    pub fn bind_count(&self) -> usize {
        self.lock().bind_count
    }

    pub fn unbind_count(&self) -> usize {
        self.lock().unbind_count
    }

    pub fn register_count(&self) -> usize {
        self.lock().register_count
    }

    pub fn connections(&self) -> Vec<Arc<SimulatedConnection>> {
        self.lock().connections.clone()
    }

    pub fn last_connection(&self) -> Option<Arc<SimulatedConnection>> {
        self.lock().connections.last().cloned()
    }

    /// Create and track a peer without offering it.
    pub fn make_peer(&self, id: ConnectionId, direction: CallDirection) -> Arc<SimulatedConnection> {
        let peer = Arc::new(SimulatedConnection::new(id, direction));
        self.lock().connections.push(Arc::clone(&peer));
        peer
    }

    /// Offer a new connection the coordinator did not ask for.
    pub fn offer_unsolicited(&self, direction: CallDirection) -> ConnectionId {
        self.offer(direction)
    }

    pub fn remote_accept(&self, id: ConnectionId) {
        if let Some(peer) = self.find(id) {
            peer.remote_update(ConnectionState::Active, None);
        }
        self.emit(ServiceEvent::StateChanged {
            id,
            change: RemoteChange::Accepted,
        });
    }

    pub fn remote_hangup(&self, id: ConnectionId) {
        if let Some(peer) = self.find(id) {
            peer.remote_update(
                ConnectionState::Disconnected,
                Some(DisconnectCause::RemoteHangup),
            );
        }
        self.emit(ServiceEvent::StateChanged {
            id,
            change: RemoteChange::HungUp,
        });
    }

    pub fn fail(&self, id: ConnectionId, message: &str) {
        if let Some(peer) = self.find(id) {
            peer.remote_update(ConnectionState::Disconnected, Some(DisconnectCause::Error));
        }
        self.emit(ServiceEvent::StateChanged {
            id,
            change: RemoteChange::Failed {
                message: message.to_string(),
            },
        });
    }

    /// Simulate the service process dying.
    pub fn disconnect_service(&self) {
        info!("[SimulatedTelephony] Service disconnected");
        self.emit(ServiceEvent::ServiceDisconnected);
    }

    fn find(&self, id: ConnectionId) -> Option<Arc<SimulatedConnection>> {
        self.lock()
            .connections
            .iter()
            .find(|peer| peer.id == id)
            .cloned()
    }

    fn offer(&self, direction: CallDirection) -> ConnectionId {
        let peer = {
            let mut shared = self.lock();
            let id = ConnectionId(shared.next_id);
            shared.next_id += 1;
            let peer = Arc::new(SimulatedConnection::new(id, direction));
            shared.connections.push(Arc::clone(&peer));
            peer
        };
        let id = peer.id;
        self.emit(ServiceEvent::ConnectionOffered(peer));
        id
    }

    fn emit(&self, event: ServiceEvent) {
        // Invoke outside the lock; the sink may call back into us.
        let listener = self.lock().listener.as_ref().map(|(_, sink)| Arc::clone(sink));
        match listener {
            Some(sink) => sink(event),
            None => debug!("[SimulatedTelephony] No listener for {:?}", event),
        }
    }
}

struct SimulatedConnector {
    telephony: SimulatedTelephony,
}

#[async_trait]
impl CallServiceConnector for SimulatedConnector {
    async fn bind(&self) -> Result<Arc<dyn CallService>, TelephonyFault> {
        let (outcome, delay, id) = {
            let mut shared = self.telephony.lock();
            shared.bind_count += 1;
            let id = shared.next_service_id;
            shared.next_service_id += 1;
            (shared.bind_outcome.clone(), shared.bind_delay, id)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match outcome {
            BindOutcome::Succeed => Ok(Arc::new(SimulatedService {
                id,
                telephony: self.telephony.clone(),
            })),
            BindOutcome::Fail(message) => Err(TelephonyFault::new(message)),
        }
    }
}

/// One bound service instance. Only the instance that installed the listener
/// may clear it.
struct SimulatedService {
    id: u64,
    telephony: SimulatedTelephony,
}

impl SimulatedService {
    fn release_listener(&self, shared: &mut Shared) {
        if matches!(shared.listener, Some((owner, _)) if owner == self.id) {
            shared.listener = None;
        } else {
            debug!(
                "[SimulatedTelephony] Service {} does not own the listener",
                self.id
            );
        }
    }

    fn add_call(&self, direction: CallDirection) -> Result<(), TelephonyFault> {
        if let Some(message) = self.telephony.lock().add_call_fault.clone() {
            return Err(TelephonyFault::new(message));
        }
        self.telephony.offer(direction);
        Ok(())
    }
}

#[async_trait]
impl CallService for SimulatedService {
    fn set_connection_listener(&self, sink: Option<ServiceEventSink>) {
        let mut shared = self.telephony.lock();
        match sink {
            Some(sink) => shared.listener = Some((self.id, sink)),
            None => self.release_listener(&mut shared),
        }
    }

    async fn register_account(&self) -> Result<bool, TelephonyFault> {
        let outcome = {
            let mut shared = self.telephony.lock();
            shared.register_count += 1;
            shared.registration.clone()
        };
        match outcome {
            RegistrationOutcome::Registered => Ok(true),
            RegistrationOutcome::Refused => Ok(false),
            RegistrationOutcome::Fault(message) => Err(TelephonyFault::new(message)),
        }
    }

    async fn add_incoming_call(&self) -> Result<(), TelephonyFault> {
        self.add_call(CallDirection::Incoming)
    }

    async fn add_outgoing_call(&self) -> Result<(), TelephonyFault> {
        self.add_call(CallDirection::Outgoing)
    }

    fn unbind(&self) {
        let mut shared = self.telephony.lock();
        shared.unbind_count += 1;
        self.release_listener(&mut shared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn collecting_sink() -> (ServiceEventSink, Arc<StdMutex<Vec<String>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ServiceEventSink = Arc::new(move |event| {
            sink_seen.lock().unwrap().push(format!("{:?}", event));
        });
        (sink, seen)
    }

    #[tokio::test]
    async fn test_add_incoming_call_offers_connection() {
        let telephony = SimulatedTelephony::new();
        let service = telephony.connector().bind().await.unwrap();
        let (sink, seen) = collecting_sink();
        service.set_connection_listener(Some(sink));

        assert!(service.register_account().await.unwrap());
        service.add_incoming_call().await.unwrap();

        let events = seen.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("ConnectionOffered"));
        let peer = telephony.last_connection().unwrap();
        assert_eq!(peer.direction(), CallDirection::Incoming);
        assert_eq!(telephony.register_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let telephony = SimulatedTelephony::new();
        telephony.set_bind_outcome(BindOutcome::Fail("denied".to_string()));
        let err = telephony.connector().bind().await.err().unwrap();
        assert_eq!(err.message, "denied");

        telephony.set_bind_outcome(BindOutcome::Succeed);
        let service = telephony.connector().bind().await.unwrap();
        telephony.set_registration(RegistrationOutcome::Refused);
        assert!(!service.register_account().await.unwrap());

        telephony.set_add_call_fault(Some("busy line".to_string()));
        assert!(service.add_outgoing_call().await.is_err());
        assert!(telephony.connections().is_empty());
        assert_eq!(telephony.bind_count(), 2);
    }

    #[tokio::test]
    async fn test_unbind_detaches_listener() {
        let telephony = SimulatedTelephony::new();
        let service = telephony.connector().bind().await.unwrap();
        let (sink, seen) = collecting_sink();
        service.set_connection_listener(Some(sink));
        service.unbind();

        telephony.disconnect_service();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(telephony.unbind_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_service_leaves_live_listener() {
        let telephony = SimulatedTelephony::new();
        let stale = telephony.connector().bind().await.unwrap();
        let live = telephony.connector().bind().await.unwrap();
        let (sink, seen) = collecting_sink();
        live.set_connection_listener(Some(sink));

        stale.set_connection_listener(None);
        stale.unbind();
        assert!(telephony.has_listener());
        assert_eq!(telephony.unbind_count(), 1);

        live.add_incoming_call().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);

        live.unbind();
        assert!(!telephony.has_listener());
    }

    #[test]
    fn test_remote_hangup_updates_peer() {
        let telephony = SimulatedTelephony::new();
        let peer = telephony.make_peer(ConnectionId(4), CallDirection::Outgoing);
        telephony.remote_hangup(ConnectionId(4));
        assert_eq!(peer.state(), ConnectionState::Disconnected);
        assert_eq!(peer.disconnect_cause(), Some(DisconnectCause::RemoteHangup));
        assert!(peer.calls().is_empty());
    }
}
