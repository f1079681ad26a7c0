//! Playback backend abstraction.
//!
//! The audio session never touches a native stream directly. It drives a
//! [`PlaybackBackend`], which owns whatever platform resources an open stream
//! needs. Native stream handles from Oboe and cpal are not `Send`, so the real
//! backends confine them to a dedicated owner thread (see `stream_thread`).

use std::sync::Arc;

use crate::audio::{StreamConfig, ToneState};
use crate::error::AudioError;

/// Trait implemented by platform-specific playback backends.
///
/// Only one stream is open at a time. `close` is idempotent and never fails.
pub trait PlaybackBackend: Send + Sync {
    /// Open and start an output stream rendering the tone gated by `tone`.
    fn open(&self, config: &StreamConfig, tone: Arc<ToneState>) -> Result<(), AudioError>;

    /// Apply a new configuration to the open stream.
    fn reconfigure(&self, config: &StreamConfig) -> Result<(), AudioError>;

    fn close(&self);

    fn is_open(&self) -> bool;

    fn is_latency_detection_supported(&self) -> bool;

    /// Output latency of the open stream, `None` when nothing is open.
    /// Negative values are native "unknown" sentinels and are passed through.
    fn current_output_latency_millis(&self) -> Option<f64>;
}

mod stream_thread;
pub use stream_thread::{OutputStream, OutputStreamDriver, StreamThreadBackend};

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::{OboeBackend, OboeDriver};

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::{CpalBackend, CpalDriver, DESKTOP_FRAMES_PER_BURST};

mod desktop_stub;
pub use desktop_stub::DesktopStubBackend;
