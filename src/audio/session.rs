//! AudioEngineSession - lifecycle and configuration of the playback engine
//!
//! The session exists (native stream open) only while the app is in the
//! foreground. It is owned by the coordinator, which serializes every call,
//! so the session itself carries no locking. Selector values set while the
//! session is inactive are kept and applied by the next `create()`.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};

use super::options::{AudioApi, BufferSizeOption, ChannelCount, OutputDevice, StreamConfig};
use super::tone::ToneState;
use crate::engine::PlaybackBackend;
use crate::error::AudioError;

/// Result of a latency query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyReading {
    /// Measured output latency in milliseconds
    Millis(f64),
    /// The platform returned a negative sentinel
    Unknown,
    /// The platform cannot measure latency at all
    Unsupported,
    /// No engine exists
    Inactive,
}

impl LatencyReading {
    /// Classify a latency query. Negative native values become `Unknown`.
    pub fn from_query(result: Result<f64, AudioError>) -> Self {
        match result {
            Ok(millis) if millis < 0.0 => LatencyReading::Unknown,
            Ok(millis) => LatencyReading::Millis(millis),
            Err(AudioError::Unsupported) => LatencyReading::Unsupported,
            Err(_) => LatencyReading::Inactive,
        }
    }
}

/// Read-only latency access that can be sampled off the coordinator's
/// context.
#[derive(Clone)]
pub struct LatencyProbe {
    backend: Arc<dyn PlaybackBackend>,
}

impl LatencyProbe {
    /// Raw native latency. The value may be negative when the platform
    /// could not measure it this time.
    pub fn query(&self) -> Result<f64, AudioError> {
        if !self.backend.is_open() {
            return Err(AudioError::EngineInactive);
        }
        if !self.backend.is_latency_detection_supported() {
            return Err(AudioError::Unsupported);
        }
        self.backend
            .current_output_latency_millis()
            .ok_or(AudioError::EngineInactive)
    }

    pub fn sample(&self) -> LatencyReading {
        LatencyReading::from_query(self.query())
    }
}

impl fmt::Debug for LatencyProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyProbe").finish_non_exhaustive()
    }
}

pub struct AudioEngineSession {
    backend: Arc<dyn PlaybackBackend>,
    tone: Arc<ToneState>,
    config: StreamConfig,
    active: bool,
}

impl AudioEngineSession {
    pub fn new(backend: Arc<dyn PlaybackBackend>, config: StreamConfig) -> Self {
        Self {
            backend,
            tone: Arc::new(ToneState::new()),
            config,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> StreamConfig {
        self.config
    }

    pub fn tone_on(&self) -> bool {
        self.active && self.tone.is_on()
    }

    /// Allocate the native engine. No-op if already active.
    pub fn create(&mut self) -> Result<(), AudioError> {
        if self.active {
            debug!("[AudioEngineSession] create() while active, ignoring");
            return Ok(());
        }
        self.tone.set_on(false);
        self.backend.open(&self.config, Arc::clone(&self.tone))?;
        self.active = true;
        info!(
            "[AudioEngineSession] Created ({} ch, buffer {}, api {})",
            self.config.channel_count.get(),
            self.config.buffer_size.label(),
            self.config.audio_api.label()
        );
        Ok(())
    }

    /// Release the native engine. Idempotent, never fails.
    pub fn destroy(&mut self) {
        self.tone.set_on(false);
        if !self.active {
            return;
        }
        self.backend.close();
        self.active = false;
        info!("[AudioEngineSession] Destroyed");
    }

    pub fn set_channel_count(&mut self, count: ChannelCount) -> Result<(), AudioError> {
        self.apply(StreamConfig {
            channel_count: count,
            ..self.config
        })
    }

    pub fn set_buffer_size_in_bursts(&mut self, size: BufferSizeOption) -> Result<(), AudioError> {
        self.apply(StreamConfig {
            buffer_size: size,
            ..self.config
        })
    }

    pub fn set_audio_api(&mut self, api: AudioApi) -> Result<(), AudioError> {
        self.apply(StreamConfig {
            audio_api: api,
            ..self.config
        })
    }

    pub fn set_output_device(&mut self, device: OutputDevice) -> Result<(), AudioError> {
        self.apply(StreamConfig {
            output_device: device,
            ..self.config
        })
    }

    /// Replace the whole configuration, e.g. when selectors reset to defaults.
    pub fn set_config(&mut self, config: StreamConfig) -> Result<(), AudioError> {
        self.apply(config)
    }

    fn apply(&mut self, next: StreamConfig) -> Result<(), AudioError> {
        if next == self.config {
            return Ok(());
        }
        if self.active {
            self.backend.reconfigure(&next)?;
        } else {
            debug!("[AudioEngineSession] Inactive, buffering {:?}", next);
        }
        self.config = next;
        Ok(())
    }

    /// Switch the test tone. Ignored while inactive.
    pub fn set_tone_on(&mut self, on: bool) {
        if !self.active {
            debug!("[AudioEngineSession] set_tone_on({}) while inactive", on);
            return;
        }
        self.tone.set_on(on);
    }

    pub fn is_latency_detection_supported(&self) -> bool {
        self.active && self.backend.is_latency_detection_supported()
    }

    /// `Unsupported` when the platform cannot measure latency at all.
    pub fn current_output_latency_millis(&self) -> Result<f64, AudioError> {
        if !self.active {
            return Err(AudioError::EngineInactive);
        }
        self.probe().query()
    }

    /// Probe for background sampling. Reads `Inactive` once the engine is gone.
    pub fn probe(&self) -> LatencyProbe {
        LatencyProbe {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl Drop for AudioEngineSession {
    fn drop(&mut self) {
        if self.active {
            warn!("[AudioEngineSession] Dropped while active, destroying");
            self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DesktopStubBackend;
    use crate::error::RejectionReason;

    fn session() -> (AudioEngineSession, Arc<DesktopStubBackend>) {
        let backend = Arc::new(DesktopStubBackend::new());
        let session = AudioEngineSession::new(backend.clone(), StreamConfig::default());
        (session, backend)
    }

    #[test]
    fn test_create_is_idempotent() {
        let (mut session, backend) = session();
        session.create().unwrap();
        session.create().unwrap();
        assert!(session.is_active());
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent_and_resets_tone() {
        let (mut session, backend) = session();
        session.create().unwrap();
        session.set_tone_on(true);
        assert!(backend.tone_on());

        session.destroy();
        session.destroy();
        assert!(!session.is_active());
        assert!(!session.tone_on());
        assert_eq!(backend.close_count(), 1);

        session.create().unwrap();
        assert!(!backend.tone_on());
    }

    #[test]
    fn test_create_failure_stays_inactive() {
        let (mut session, backend) = session();
        backend.set_unavailable(true);
        let err = session.create().unwrap_err();
        assert!(matches!(err, AudioError::EngineUnavailable { .. }));
        assert!(!session.is_active());
    }

    #[test]
    fn test_setters_apply_while_active() {
        let (mut session, backend) = session();
        session.create().unwrap();
        session.set_channel_count(ChannelCount::MONO).unwrap();
        session.set_audio_api(AudioApi::AAudio).unwrap();

        let config = backend.current_config().unwrap();
        assert_eq!(config.channel_count, ChannelCount::MONO);
        assert_eq!(config.audio_api, AudioApi::AAudio);
        assert_eq!(backend.reconfigure_count(), 2);
    }

    #[test]
    fn test_setters_buffer_while_inactive() {
        let (mut session, backend) = session();
        session
            .set_buffer_size_in_bursts(BufferSizeOption::Four)
            .unwrap();
        session.set_output_device(OutputDevice::Id(3)).unwrap();
        assert_eq!(backend.reconfigure_count(), 0);

        session.create().unwrap();
        let config = backend.current_config().unwrap();
        assert_eq!(config.buffer_size, BufferSizeOption::Four);
        assert_eq!(config.output_device, OutputDevice::Id(3));
    }

    #[test]
    fn test_tone_ignored_while_inactive() {
        let (mut session, _backend) = session();
        session.set_tone_on(true);
        assert!(!session.tone_on());
    }

    #[test]
    fn test_latency_readings() {
        let (mut session, backend) = session();
        assert_eq!(
            session.current_output_latency_millis(),
            Err(AudioError::EngineInactive)
        );

        session.create().unwrap();
        backend.set_latency_millis(21.5);
        assert_eq!(session.current_output_latency_millis(), Ok(21.5));
        assert_eq!(session.probe().sample(), LatencyReading::Millis(21.5));

        backend.set_latency_millis(-1.0);
        assert_eq!(session.probe().sample(), LatencyReading::Unknown);

        backend.set_latency_supported(false);
        assert!(!session.is_latency_detection_supported());
        let err = session.current_output_latency_millis().unwrap_err();
        assert_eq!(err, AudioError::Unsupported);
        assert_eq!(err.reason(), RejectionReason::Unsupported);
        assert_eq!(session.probe().sample(), LatencyReading::Unsupported);
    }

    #[test]
    fn test_probe_reads_inactive_after_destroy() {
        let (mut session, _backend) = session();
        session.create().unwrap();
        let probe = session.probe();
        assert!(matches!(probe.sample(), LatencyReading::Millis(_)));
        session.destroy();
        assert_eq!(probe.sample(), LatencyReading::Inactive);
    }
}
