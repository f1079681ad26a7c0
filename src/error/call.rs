// Call error types and constants

use crate::error::{ErrorCode, RejectionReason};
use crate::telephony::{ConnectionState, Permission};
use log::error;
use std::fmt;

/// Call error code constants
///
/// Error code range: 2001-2008
pub struct CallErrorCodes {}

impl CallErrorCodes {
    /// Telephony service could not be bound
    pub const BIND_FAILED: i32 = 2001;

    /// Phone account registration was refused or failed
    pub const REGISTRATION_FAILED: i32 = 2002;

    /// Required runtime permissions are missing
    pub const PERMISSION_REQUIRED: i32 = 2003;

    /// Answer requested with no connection
    pub const NO_ACTIVE_CALL: i32 = 2004;

    /// A connection exists or a call request is already in flight
    pub const CONNECTION_BUSY: i32 = 2005;

    /// Call request issued while the service is not bound
    pub const SERVICE_UNBOUND: i32 = 2006;

    /// Telephony facade reported an error
    pub const TELEPHONY_FAULT: i32 = 2007;

    /// Connection state machine rejected a transition
    pub const INVALID_TRANSITION: i32 = 2008;
}

/// Log a call error with structured context
pub fn log_call_error(err: &CallError, context: &str) {
    error!(
        "Call error in {}: code={}, component=CallServiceBinding, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Call-related errors
///
/// Covers binding, account registration, call requests and the connection
/// state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    BindFailed { reason: String },
    RegistrationFailed { reason: String },
    PermissionRequired { missing: Vec<Permission> },
    NoActiveCall,
    ConnectionBusy,
    ServiceUnbound,
    TelephonyFault { message: String },
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl CallError {
    /// Map onto the presentation-level rejection taxonomy.
    pub fn reason(&self) -> RejectionReason {
        match self {
            CallError::BindFailed { .. } => RejectionReason::BindFailed,
            CallError::RegistrationFailed { .. } => RejectionReason::RegistrationFailed,
            CallError::PermissionRequired { .. } => RejectionReason::PermissionRequired,
            CallError::NoActiveCall => RejectionReason::NoActiveCall,
            CallError::ConnectionBusy => RejectionReason::ConnectionBusy,
            CallError::ServiceUnbound => RejectionReason::ServiceUnbound,
            CallError::TelephonyFault { .. } | CallError::InvalidTransition { .. } => {
                RejectionReason::TelephonyFault
            }
        }
    }
}

impl ErrorCode for CallError {
    fn code(&self) -> i32 {
        match self {
            CallError::BindFailed { .. } => CallErrorCodes::BIND_FAILED,
            CallError::RegistrationFailed { .. } => CallErrorCodes::REGISTRATION_FAILED,
            CallError::PermissionRequired { .. } => CallErrorCodes::PERMISSION_REQUIRED,
            CallError::NoActiveCall => CallErrorCodes::NO_ACTIVE_CALL,
            CallError::ConnectionBusy => CallErrorCodes::CONNECTION_BUSY,
            CallError::ServiceUnbound => CallErrorCodes::SERVICE_UNBOUND,
            CallError::TelephonyFault { .. } => CallErrorCodes::TELEPHONY_FAULT,
            CallError::InvalidTransition { .. } => CallErrorCodes::INVALID_TRANSITION,
        }
    }

    fn message(&self) -> String {
        match self {
            CallError::BindFailed { reason } => {
                format!("Failed to bind telephony service: {}", reason)
            }
            CallError::RegistrationFailed { reason } => {
                format!("Account isn't registered: {}", reason)
            }
            CallError::PermissionRequired { missing } => {
                let names: Vec<&str> = missing.iter().map(|p| p.android_name()).collect();
                format!("Don't have permissions: {}", names.join(", "))
            }
            CallError::NoActiveCall => "There is no call".to_string(),
            CallError::ConnectionBusy => "Drop the connection first".to_string(),
            CallError::ServiceUnbound => "Telephony service is not bound".to_string(),
            CallError::TelephonyFault { message } => {
                format!("Telephony fault: {}", message)
            }
            CallError::InvalidTransition { from, to } => {
                format!("Invalid connection transition {} -> {}", from, to)
            }
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CallError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CallError {}
