// Audio error types and constants

use crate::error::{ErrorCode, RejectionReason};
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes attached to audio session
/// failures.
///
/// Error code range: 1001-1005
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Audio subsystem could not be acquired (e.g. exclusive stream held elsewhere)
    pub const ENGINE_UNAVAILABLE: i32 = 1001;

    /// Operation requires an active engine session
    pub const ENGINE_INACTIVE: i32 = 1002;

    /// Setter received a value outside its option table
    pub const INVALID_CONFIGURATION: i32 = 1003;

    /// Platform cannot report output latency
    pub const UNSUPPORTED: i32 = 1004;

    /// Stream reconfigure or owner-thread failure
    pub const STREAM_FAILURE: i32 = 1005;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioEngineSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover engine session creation, configuration and latency
/// queries.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The native audio subsystem could not be acquired
    EngineUnavailable { reason: String },

    /// The engine session is not active
    EngineInactive,

    /// A configuration value is outside its allowed range
    InvalidConfiguration { field: &'static str, value: i64 },

    /// Latency is not measurable on this platform
    Unsupported,

    /// Stream reconfigure failed or the stream owner thread went away
    StreamFailure { reason: String },
}

impl AudioError {
    /// Map onto the presentation-level rejection taxonomy.
    pub fn reason(&self) -> RejectionReason {
        match self {
            AudioError::EngineUnavailable { .. } | AudioError::StreamFailure { .. } => {
                RejectionReason::EngineUnavailable
            }
            AudioError::EngineInactive => RejectionReason::EngineInactive,
            AudioError::InvalidConfiguration { .. } => RejectionReason::InvalidConfiguration,
            AudioError::Unsupported => RejectionReason::Unsupported,
        }
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::EngineUnavailable { .. } => AudioErrorCodes::ENGINE_UNAVAILABLE,
            AudioError::EngineInactive => AudioErrorCodes::ENGINE_INACTIVE,
            AudioError::InvalidConfiguration { .. } => AudioErrorCodes::INVALID_CONFIGURATION,
            AudioError::Unsupported => AudioErrorCodes::UNSUPPORTED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::EngineUnavailable { reason } => {
                format!("Audio engine unavailable: {}", reason)
            }
            AudioError::EngineInactive => {
                "Audio engine not active. Bring the app to the foreground first.".to_string()
            }
            AudioError::InvalidConfiguration { field, value } => {
                format!("Invalid {} value: {}", field, value)
            }
            AudioError::Unsupported => {
                "Latency detection is not supported on this platform".to_string()
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}
