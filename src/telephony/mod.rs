//! Telephony facade consumed by the coordinator.
//!
//! The telephony stack itself is external. This module only defines the
//! interface the coordinator needs: a connector that binds to the call
//! service, the bound service, and the per-call peer handle. Events from the
//! service arrive on arbitrary threads through a [`ServiceEventSink`].

mod binding;
mod connection;
mod permissions;
pub mod simulated;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use binding::{BindingState, CallServiceBinding, PendingBind};
pub use connection::{CallConnection, ConnectionListener};
pub use permissions::{
    Permission, PermissionState, StaticPermissions, PERMISSION_REQUEST_CODE, REQUIRED_PERMISSIONS,
};

/// Opaque identifier assigned by the telephony service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Incoming => write!(f, "incoming"),
            CallDirection::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Why a connection reached `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    LocalCancel,
    RemoteHangup,
    Error,
}

/// Lifecycle of a single call connection.
///
/// `New -> {Dialing | Ringing} -> Active -> Disconnected -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    Dialing,
    Ringing,
    Active,
    Disconnected,
    Destroyed,
}

impl ConnectionState {
    /// Text shown in the call state label.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::New => "New",
            ConnectionState::Dialing => "Dialing",
            ConnectionState::Ringing => "Ringing",
            ConnectionState::Active => "Active",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Destroyed => "Destroyed",
        }
    }

    /// `Disconnected` and `Destroyed` accept no further call transitions.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Destroyed
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error surfaced by the external telephony stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelephonyFault {
    pub message: String,
}

impl TelephonyFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TelephonyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TelephonyFault {}

/// State change initiated by the remote side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    Accepted,
    HungUp,
    Failed { message: String },
}

/// Events pushed by the bound service.
pub enum ServiceEvent {
    ConnectionOffered(Arc<dyn ConnectionPeer>),
    StateChanged {
        id: ConnectionId,
        change: RemoteChange,
    },
    ServiceDisconnected,
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEvent::ConnectionOffered(peer) => f
                .debug_struct("ConnectionOffered")
                .field("id", &peer.id())
                .field("direction", &peer.direction())
                .finish(),
            ServiceEvent::StateChanged { id, change } => f
                .debug_struct("StateChanged")
                .field("id", id)
                .field("change", change)
                .finish(),
            ServiceEvent::ServiceDisconnected => f.write_str("ServiceDisconnected"),
        }
    }
}

/// Listener installed on the bound service. May be invoked from any thread.
pub type ServiceEventSink = Arc<dyn Fn(ServiceEvent) + Send + Sync>;

/// Handle to one connection owned by the telephony service.
pub trait ConnectionPeer: Send + Sync {
    fn id(&self) -> ConnectionId;
    fn direction(&self) -> CallDirection;
    /// State as last reported to the service.
    fn state(&self) -> ConnectionState;
    fn set_active(&self);
    fn set_disconnected(&self, cause: DisconnectCause);
    fn destroy(&self);
}

/// A bound telephony service.
#[async_trait]
pub trait CallService: Send + Sync {
    /// Install or clear the event listener. `None` detaches.
    fn set_connection_listener(&self, sink: Option<ServiceEventSink>);

    /// Returns `Ok(false)` when the platform refuses the account.
    async fn register_account(&self) -> Result<bool, TelephonyFault>;

    async fn add_incoming_call(&self) -> Result<(), TelephonyFault>;

    async fn add_outgoing_call(&self) -> Result<(), TelephonyFault>;

    /// Release the binding. Never fails.
    fn unbind(&self);
}

/// Entry point used to bind to the telephony service.
#[async_trait]
pub trait CallServiceConnector: Send + Sync {
    async fn bind(&self) -> Result<Arc<dyn CallService>, TelephonyFault>;
}
