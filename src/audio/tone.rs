//! Tone - sine test tone generation for the playback stream
//!
//! The tone is gated by a shared atomic flag so the UI gesture path can switch
//! it on and off without touching the audio thread. The oscillator itself is
//! owned by the audio callback and keeps its phase across buffers.
//!
//! Real-time safety:
//! - No allocations or locks in `next_sample` / `fill_interleaved`
//! - Only a relaxed atomic load per buffer

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frequency of the test tone in Hz
pub const TONE_FREQUENCY_HZ: f32 = 440.0;

/// Peak amplitude of the test tone
pub const TONE_AMPLITUDE: f32 = 0.3;

/// Sample rate assumed until the stream reports its own
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Shared on/off switch between the control path and the audio callback.
#[derive(Debug, Default)]
pub struct ToneState {
    on: AtomicBool,
}

impl ToneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on(&self, on: bool) {
        self.on.store(on, Ordering::Relaxed);
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}

/// Phase increment per sample for the given sample rate.
#[inline]
pub fn phase_increment(sample_rate: u32) -> f32 {
    TAU * TONE_FREQUENCY_HZ / sample_rate.max(1) as f32
}

/// Sine oscillator driven from the audio callback.
pub struct ToneOscillator {
    state: Arc<ToneState>,
    phase: f32,
    increment: f32,
    sample_rate: u32,
}

impl ToneOscillator {
    pub fn new(state: Arc<ToneState>, sample_rate: u32) -> Self {
        Self {
            state,
            phase: 0.0,
            increment: phase_increment(sample_rate),
            sample_rate,
        }
    }

    /// Adopt the sample rate the stream actually opened with.
    #[inline]
    pub fn prepare(&mut self, sample_rate: u32) {
        if sample_rate != 0 && sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.increment = phase_increment(sample_rate);
        }
    }

    #[inline]
    fn advance(&mut self) -> f32 {
        let value = self.phase.sin() * TONE_AMPLITUDE;
        self.phase += self.increment;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        value
    }

    /// Next mono sample, silence while the tone is off.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.state.is_on() {
            self.advance()
        } else {
            0.0
        }
    }

    /// Fill an interleaved buffer, writing the same sample to every channel.
    pub fn fill_interleaved(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if !self.state.is_on() {
            data.fill(0.0);
            return;
        }

        for frame in data.chunks_mut(channels) {
            let value = self.advance();
            frame.fill(value);
        }
    }
}
