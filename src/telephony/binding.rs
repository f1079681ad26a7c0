//! Connection to the external telephony service.
//!
//! Binding is asynchronous: `bind()` hands back a [`PendingBind`] that the
//! caller resolves on a spawned task, and the result comes back through
//! `complete_bind()` tagged with the epoch it was started under. `unbind()`
//! bumps the epoch, so a completion or event that raced it is recognised as
//! stale and released instead of resurrecting the binding.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::{
    CallConnection, CallService, CallServiceConnector, DisconnectCause, ServiceEventSink,
    TelephonyFault,
};
use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Unbound,
    Binding,
    Bound,
}

/// An in-flight bind request, resolved off the serialized context.
pub struct PendingBind {
    epoch: u64,
    connector: Arc<dyn CallServiceConnector>,
}

impl PendingBind {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub async fn resolve(self) -> (u64, Result<Arc<dyn CallService>, TelephonyFault>) {
        let result = self.connector.bind().await;
        (self.epoch, result)
    }
}

pub struct CallServiceBinding {
    connector: Arc<dyn CallServiceConnector>,
    state: BindingState,
    epoch: u64,
    service: Option<Arc<dyn CallService>>,
}

impl CallServiceBinding {
    pub fn new(connector: Arc<dyn CallServiceConnector>) -> Self {
        Self {
            connector,
            state: BindingState::Unbound,
            epoch: 0,
            service: None,
        }
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_bound(&self) -> bool {
        self.state == BindingState::Bound
    }

    /// True if events tagged with `epoch` come from the live binding.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_bound() && self.epoch == epoch
    }

    pub fn service(&self) -> Option<Arc<dyn CallService>> {
        self.service.clone()
    }

    /// Start binding. Returns `None` when already binding or bound.
    pub fn bind(&mut self) -> Option<PendingBind> {
        if self.state != BindingState::Unbound {
            debug!("[CallServiceBinding] bind ignored, state {:?}", self.state);
            return None;
        }
        self.epoch += 1;
        self.state = BindingState::Binding;
        info!("[CallServiceBinding] Binding (epoch {})", self.epoch);
        Some(PendingBind {
            epoch: self.epoch,
            connector: Arc::clone(&self.connector),
        })
    }

    /// Apply a bind result.
    ///
    /// `Ok(true)` means the binding is now `Bound` and `make_sink` supplied
    /// its listener. `Ok(false)` means the result was stale and any service
    /// it carried has been released.
    pub fn complete_bind(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn CallService>, TelephonyFault>,
        make_sink: impl FnOnce(u64) -> ServiceEventSink,
    ) -> Result<bool, CallError> {
        if epoch != self.epoch || self.state != BindingState::Binding {
            warn!(
                "[CallServiceBinding] Stale bind completion (epoch {}, current {})",
                epoch, self.epoch
            );
            if let Ok(service) = result {
                service.unbind();
            }
            return Ok(false);
        }

        match result {
            Ok(service) => {
                service.set_connection_listener(Some(make_sink(epoch)));
                self.service = Some(service);
                self.state = BindingState::Bound;
                info!("[CallServiceBinding] Bound (epoch {})", epoch);
                Ok(true)
            }
            Err(fault) => {
                self.state = BindingState::Unbound;
                Err(CallError::BindFailed {
                    reason: fault.message,
                })
            }
        }
    }

    /// Release the service. Any live connection is force-closed first.
    ///
    /// Idempotent. Returns true if there was anything to release.
    pub fn unbind(&mut self, connection: &mut Option<CallConnection>) -> bool {
        let closed_connection = match connection.take() {
            Some(live) => {
                info!(
                    "[CallServiceBinding] Closing {} before unbind",
                    live.id()
                );
                live.close_locally(DisconnectCause::LocalCancel);
                true
            }
            None => false,
        };

        if self.state == BindingState::Unbound {
            return closed_connection;
        }

        self.epoch += 1;
        self.state = BindingState::Unbound;
        if let Some(service) = self.service.take() {
            service.set_connection_listener(None);
            service.unbind();
        }
        info!("[CallServiceBinding] Unbound (epoch now {})", self.epoch);
        true
    }
}

impl fmt::Debug for CallServiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallServiceBinding")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .finish()
    }
}
