//! Oboe output callbacks rendering the test tone.
//!
//! oboe-rs fixes the channel layout in the callback's `FrameType`, so there is
//! one callback per layout. Both run on the real-time audio thread and only
//! touch the oscillator and its atomic on/off flag.

use oboe::{AudioOutputCallback, AudioOutputStreamSafe, AudioStreamBase, DataCallbackResult};
use std::sync::Arc;

use super::tone::{ToneOscillator, ToneState, DEFAULT_SAMPLE_RATE};

pub struct MonoToneCallback {
    oscillator: ToneOscillator,
}

impl MonoToneCallback {
    pub fn new(tone: Arc<ToneState>) -> Self {
        Self {
            oscillator: ToneOscillator::new(tone, DEFAULT_SAMPLE_RATE),
        }
    }
}

impl AudioOutputCallback for MonoToneCallback {
    type FrameType = (f32, oboe::Mono);

    fn on_audio_ready(
        &mut self,
        stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [f32],
    ) -> DataCallbackResult {
        self.oscillator.prepare(stream.get_sample_rate() as u32);
        self.oscillator.fill_interleaved(frames, 1);
        DataCallbackResult::Continue
    }
}

pub struct StereoToneCallback {
    oscillator: ToneOscillator,
}

impl StereoToneCallback {
    pub fn new(tone: Arc<ToneState>) -> Self {
        Self {
            oscillator: ToneOscillator::new(tone, DEFAULT_SAMPLE_RATE),
        }
    }
}

impl AudioOutputCallback for StereoToneCallback {
    type FrameType = (f32, oboe::Stereo);

    fn on_audio_ready(
        &mut self,
        stream: &mut dyn AudioOutputStreamSafe,
        frames: &mut [(f32, f32)],
    ) -> DataCallbackResult {
        self.oscillator.prepare(stream.get_sample_rate() as u32);
        for frame in frames.iter_mut() {
            let sample = self.oscillator.next_sample();
            *frame = (sample, sample);
        }
        DataCallbackResult::Continue
    }
}
