//! Call connection state machine.
//!
//! A `CallConnection` is the single source of truth for "is there currently a
//! call". It wraps the peer handle offered by the service, validates every
//! transition and reports each new state to its listener. Closing consumes
//! the connection, so `Destroyed` is reached exactly once.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use super::{CallDirection, ConnectionId, ConnectionPeer, ConnectionState, DisconnectCause};
use crate::error::CallError;

/// Observer of connection transitions. Runs on the thread that drives the
/// transition.
pub type ConnectionListener = Box<dyn Fn(ConnectionId, ConnectionState) + Send>;

fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    matches!(
        (from, to),
        (New, Dialing)
            | (New, Ringing)
            | (Dialing, Active)
            | (Ringing, Active)
            | (New, Disconnected)
            | (Dialing, Disconnected)
            | (Ringing, Disconnected)
            | (Active, Disconnected)
            | (Disconnected, Destroyed)
    )
}

pub struct CallConnection {
    peer: Arc<dyn ConnectionPeer>,
    id: ConnectionId,
    direction: CallDirection,
    state: ConnectionState,
    disconnect_cause: Option<DisconnectCause>,
    listener: Option<ConnectionListener>,
}

impl CallConnection {
    /// Track a connection the service just offered. Starts in `New`.
    pub fn offered(peer: Arc<dyn ConnectionPeer>, listener: ConnectionListener) -> Self {
        Self {
            id: peer.id(),
            direction: peer.direction(),
            peer,
            state: ConnectionState::New,
            disconnect_cause: None,
            listener: Some(listener),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        self.disconnect_cause
    }

    /// `New -> Ringing` for incoming calls, `New -> Dialing` for outgoing.
    pub fn begin(&mut self) -> Result<ConnectionState, CallError> {
        let next = match self.direction {
            CallDirection::Incoming => ConnectionState::Ringing,
            CallDirection::Outgoing => ConnectionState::Dialing,
        };
        self.transition(next)?;
        Ok(next)
    }

    /// Local answer. Marks the peer active. Answering an active call does
    /// nothing.
    pub fn answer(&mut self) -> Result<(), CallError> {
        if self.state == ConnectionState::Active {
            debug!("[CallConnection] {} already active", self.id);
            return Ok(());
        }
        self.transition(ConnectionState::Active)?;
        self.peer.set_active();
        Ok(())
    }

    /// Remote side accepted. The peer already reports itself active.
    pub fn remote_accepted(&mut self) -> Result<(), CallError> {
        self.transition(ConnectionState::Active)
    }

    /// Close from this side: the peer is told to disconnect, then destroyed.
    pub fn close_locally(mut self, cause: DisconnectCause) {
        self.finish(cause, true);
    }

    /// The remote side ended the call. Only the local destroy remains.
    pub fn closed_remotely(mut self, cause: DisconnectCause) {
        self.finish(cause, false);
    }

    /// No listener invocation happens after this returns.
    pub fn detach(&mut self) {
        self.listener = None;
    }

    fn transition(&mut self, to: ConnectionState) -> Result<(), CallError> {
        if !is_valid_transition(self.state, to) {
            return Err(CallError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!("[CallConnection] {} {} -> {}", self.id, self.state, to);
        self.state = to;
        if let Some(listener) = &self.listener {
            listener(self.id, to);
        }
        Ok(())
    }

    fn finish(&mut self, cause: DisconnectCause, notify_peer: bool) {
        if self.state == ConnectionState::Destroyed {
            return;
        }
        if self.state != ConnectionState::Disconnected {
            self.disconnect_cause = Some(cause);
            if notify_peer {
                self.peer.set_disconnected(cause);
            }
            // Every non-closed state may disconnect.
            let _ = self.transition(ConnectionState::Disconnected);
        }
        self.peer.destroy();
        let _ = self.transition(ConnectionState::Destroyed);
        self.listener = None;
    }
}

impl fmt::Debug for CallConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallConnection")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("disconnect_cause", &self.disconnect_cause)
            .field("attached", &self.listener.is_some())
            .finish()
    }
}

impl Drop for CallConnection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Destroyed {
            warn!(
                "[CallConnection] {} dropped in state {}, closing",
                self.id, self.state
            );
            self.finish(DisconnectCause::LocalCancel, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telephony::simulated::SimulatedConnection;
    use crate::telephony::simulated::PeerCall;
    use std::sync::Mutex;

    fn recording_listener() -> (ConnectionListener, Arc<Mutex<Vec<ConnectionState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: ConnectionListener = Box::new(move |_, state| {
            sink.lock().unwrap().push(state);
        });
        (listener, seen)
    }

    #[test]
    fn test_incoming_answer_drop() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(1), CallDirection::Incoming));
        let (listener, seen) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);

        assert_eq!(connection.begin().unwrap(), ConnectionState::Ringing);
        connection.answer().unwrap();
        assert_eq!(connection.state(), ConnectionState::Active);
        connection.close_locally(DisconnectCause::LocalCancel);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Ringing,
                ConnectionState::Active,
                ConnectionState::Disconnected,
                ConnectionState::Destroyed,
            ]
        );
        assert_eq!(
            peer.calls(),
            vec![
                PeerCall::SetActive,
                PeerCall::SetDisconnected(DisconnectCause::LocalCancel),
                PeerCall::Destroy,
            ]
        );
    }

    #[test]
    fn test_outgoing_begins_dialing() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(2), CallDirection::Outgoing));
        let (listener, _) = recording_listener();
        let mut connection = CallConnection::offered(peer, listener);
        assert_eq!(connection.begin().unwrap(), ConnectionState::Dialing);
        connection.remote_accepted().unwrap();
        assert_eq!(connection.state(), ConnectionState::Active);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(3), CallDirection::Incoming));
        let (listener, seen) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);

        let err = connection.answer().unwrap_err();
        assert_eq!(
            err,
            CallError::InvalidTransition {
                from: ConnectionState::New,
                to: ConnectionState::Active,
            }
        );
        assert_eq!(connection.state(), ConnectionState::New);
        assert!(seen.lock().unwrap().is_empty());
        assert!(peer.calls().is_empty());

        connection.begin().unwrap();
        connection.answer().unwrap();
        assert!(connection.remote_accepted().is_err());
    }

    #[test]
    fn test_repeated_answer_is_noop() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(5), CallDirection::Incoming));
        let (listener, seen) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);
        connection.begin().unwrap();
        connection.answer().unwrap();
        connection.answer().unwrap();

        assert_eq!(connection.state(), ConnectionState::Active);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionState::Ringing, ConnectionState::Active]
        );
        assert_eq!(peer.calls(), vec![PeerCall::SetActive]);
    }

    #[test]
    fn test_detach_silences_listener() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(4), CallDirection::Incoming));
        let (listener, seen) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);
        connection.begin().unwrap();
        connection.detach();
        connection.close_locally(DisconnectCause::LocalCancel);

        assert_eq!(*seen.lock().unwrap(), vec![ConnectionState::Ringing]);
        assert!(peer.calls().contains(&PeerCall::Destroy));
    }

    #[test]
    fn test_remote_close_skips_peer_disconnect() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(5), CallDirection::Incoming));
        let (listener, seen) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);
        connection.begin().unwrap();
        connection.closed_remotely(DisconnectCause::RemoteHangup);

        assert_eq!(peer.calls(), vec![PeerCall::Destroy]);
        assert_eq!(
            seen.lock().unwrap().last().copied(),
            Some(ConnectionState::Destroyed)
        );
    }

    #[test]
    fn test_drop_closes_live_connection() {
        let peer = Arc::new(SimulatedConnection::new(ConnectionId(6), CallDirection::Outgoing));
        let (listener, _) = recording_listener();
        let mut connection = CallConnection::offered(peer.clone(), listener);
        connection.begin().unwrap();
        drop(connection);

        assert_eq!(
            peer.calls(),
            vec![
                PeerCall::SetDisconnected(DisconnectCause::LocalCancel),
                PeerCall::Destroy
            ]
        );
    }
}
