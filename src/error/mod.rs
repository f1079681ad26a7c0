// Error types for the hello-oboe coordinator
//
// This module defines custom error types for audio session and call operations,
// providing structured error handling with error codes suitable for reporting
// through the single command-rejection channel.

mod audio;
mod call;

use serde::{Deserialize, Serialize};

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use call::{log_call_error, CallError, CallErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the presentation boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Reason reported through `Presenter::on_command_rejected`.
///
/// Every variant is recoverable and user-visible. None of them terminates
/// the process or leaves a resource half-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    EngineUnavailable,
    EngineInactive,
    InvalidConfiguration,
    Unsupported,
    BindFailed,
    RegistrationFailed,
    PermissionRequired,
    NoActiveCall,
    ConnectionBusy,
    ServiceUnbound,
    TelephonyFault,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::EngineUnavailable => "engine_unavailable",
            RejectionReason::EngineInactive => "engine_inactive",
            RejectionReason::InvalidConfiguration => "invalid_configuration",
            RejectionReason::Unsupported => "unsupported",
            RejectionReason::BindFailed => "bind_failed",
            RejectionReason::RegistrationFailed => "registration_failed",
            RejectionReason::PermissionRequired => "permission_required",
            RejectionReason::NoActiveCall => "no_active_call",
            RejectionReason::ConnectionBusy => "connection_busy",
            RejectionReason::ServiceUnbound => "service_unbound",
            RejectionReason::TelephonyFault => "telephony_fault",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
