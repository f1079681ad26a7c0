use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{StreamConfig, ToneState};
use crate::error::AudioError;

use super::PlaybackBackend;

struct StubStream {
    config: StreamConfig,
    tone: Arc<ToneState>,
}

/// Desktop stub backend used for deterministic testing and CLI tooling.
///
/// Simulates the stream lifecycle without real audio I/O and counts every
/// open and close, so callers can check that at most one stream was ever
/// outstanding.
pub struct DesktopStubBackend {
    stream: Mutex<Option<StubStream>>,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
    reconfigure_count: AtomicUsize,
    max_outstanding: AtomicUsize,
    unavailable: AtomicBool,
    latency_supported: AtomicBool,
    latency_millis: Mutex<f64>,
}

impl DesktopStubBackend {
    pub fn new() -> Self {
        Self {
            stream: Mutex::new(None),
            open_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            reconfigure_count: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            latency_supported: AtomicBool::new(true),
            latency_millis: Mutex::new(10.0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<StubStream>> {
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next opens fail as if the device were held elsewhere.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency_supported(&self, supported: bool) {
        self.latency_supported.store(supported, Ordering::SeqCst);
    }

    /// Latency reported by the open stream. Negative values act as the
    /// native "unknown" sentinel.
    pub fn set_latency_millis(&self, millis: f64) {
        *self.latency_millis.lock().unwrap_or_else(|e| e.into_inner()) = millis;
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn reconfigure_count(&self) -> usize {
        self.reconfigure_count.load(Ordering::SeqCst)
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn current_config(&self) -> Option<StreamConfig> {
        self.lock().as_ref().map(|stream| stream.config)
    }

    /// Whether the open stream is currently rendering the tone.
    pub fn tone_on(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|stream| stream.tone.is_on())
            .unwrap_or(false)
    }
}

impl Default for DesktopStubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for DesktopStubBackend {
    fn open(&self, config: &StreamConfig, tone: Arc<ToneState>) -> Result<(), AudioError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AudioError::EngineUnavailable {
                reason: "stub device unavailable".to_string(),
            });
        }

        let mut stream = self.lock();
        if stream.is_some() {
            return Err(AudioError::EngineUnavailable {
                reason: "stub stream already open".to_string(),
            });
        }
        *stream = Some(StubStream {
            config: *config,
            tone,
        });

        self.open_count.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.open_count() - self.close_count();
        self.max_outstanding.fetch_max(outstanding, Ordering::SeqCst);
        Ok(())
    }

    fn reconfigure(&self, config: &StreamConfig) -> Result<(), AudioError> {
        let mut stream = self.lock();
        let stream = stream.as_mut().ok_or(AudioError::EngineInactive)?;
        stream.config = *config;
        self.reconfigure_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        if self.lock().take().is_some() {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn is_latency_detection_supported(&self) -> bool {
        self.latency_supported.load(Ordering::SeqCst)
    }

    fn current_output_latency_millis(&self) -> Option<f64> {
        if !self.is_open() {
            return None;
        }
        Some(*self.latency_millis.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_counts_lifecycle() {
        let backend = DesktopStubBackend::new();
        let tone = Arc::new(ToneState::new());

        backend.open(&StreamConfig::default(), tone.clone()).unwrap();
        assert!(backend.open(&StreamConfig::default(), tone.clone()).is_err());
        backend.close();
        backend.close();
        backend.open(&StreamConfig::default(), tone).unwrap();

        assert_eq!(backend.open_count(), 2);
        assert_eq!(backend.close_count(), 1);
        assert_eq!(backend.max_outstanding(), 1);
    }

    #[test]
    fn test_stub_unavailable() {
        let backend = DesktopStubBackend::new();
        backend.set_unavailable(true);
        let err = backend
            .open(&StreamConfig::default(), Arc::new(ToneState::new()))
            .unwrap_err();
        assert!(matches!(err, AudioError::EngineUnavailable { .. }));
        assert!(!backend.is_open());
    }

    #[test]
    fn test_stub_latency_only_while_open() {
        let backend = DesktopStubBackend::new();
        assert_eq!(backend.current_output_latency_millis(), None);
        backend
            .open(&StreamConfig::default(), Arc::new(ToneState::new()))
            .unwrap();
        backend.set_latency_millis(-1.0);
        assert_eq!(backend.current_output_latency_millis(), Some(-1.0));
    }
}
