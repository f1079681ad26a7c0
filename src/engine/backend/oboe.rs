use std::sync::Arc;

use log::{info, warn};
use oboe::{
    AudioStream, AudioStreamAsync, AudioStreamBase, AudioStreamBuilder,
    Output, PerformanceMode, SharingMode,
};

use super::stream_thread::{OutputStream, OutputStreamDriver, StreamThreadBackend};
use crate::audio::callback::{MonoToneCallback, StereoToneCallback};
use crate::audio::{AudioApi, OutputDevice, StreamConfig, ToneState};
use crate::error::AudioError;

/// Android backend driving an Oboe output stream on its owner thread.
pub type OboeBackend = StreamThreadBackend<OboeDriver>;

pub enum OboeStream {
    Mono(AudioStreamAsync<Output, MonoToneCallback>),
    Stereo(AudioStreamAsync<Output, StereoToneCallback>),
}

pub struct OboeDriver;

fn oboe_api(api: AudioApi) -> oboe::AudioApi {
    match api {
        AudioApi::Unspecified => oboe::AudioApi::Unspecified,
        AudioApi::OpenSlEs => oboe::AudioApi::OpenSLES,
        AudioApi::AAudio => oboe::AudioApi::AAudio,
    }
}

fn open_failed(e: oboe::Error) -> AudioError {
    AudioError::EngineUnavailable {
        reason: format!("failed to open Oboe output stream: {:?}", e),
    }
}

// Both variants expose the same stream API; dispatch without naming the
// callback-specific stream type.
macro_rules! with_stream {
    ($stream:expr, $s:ident => $body:expr) => {
        match $stream {
            OboeStream::Mono($s) => $body,
            OboeStream::Stereo($s) => $body,
        }
    };
}

impl OboeStream {
    fn start(mut self, config: &StreamConfig) -> Result<Self, AudioError> {
        let bursts = config.buffer_size.bursts() as i32;
        with_stream!(&mut self, stream => {
            if bursts > 0 {
                let frames = stream.get_frames_per_burst() * bursts;
                if let Err(e) = stream.set_buffer_size_in_frames(frames) {
                    warn!("[OboeBackend] set_buffer_size_in_frames({}) failed: {:?}", frames, e);
                }
            }
            stream.start().map_err(|e| AudioError::EngineUnavailable {
                reason: format!("failed to start Oboe output stream: {:?}", e),
            })?;
            info!(
                "[OboeBackend] Started: rate {} Hz, burst {} frames, api {:?}",
                stream.get_sample_rate(),
                stream.get_frames_per_burst(),
                stream.get_audio_api()
            );
        });
        Ok(self)
    }
}

impl OutputStreamDriver for OboeDriver {
    type Stream = OboeStream;
    const NAME: &'static str = "OboeBackend";

    fn open(config: &StreamConfig, tone: Arc<ToneState>) -> Result<OboeStream, AudioError> {
        let device_id = match config.output_device {
            OutputDevice::Default => 0,
            OutputDevice::Id(id) => id,
        };
        let builder = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Exclusive)
            .set_audio_api(oboe_api(config.audio_api))
            .set_device_id(device_id)
            .set_direction::<Output>()
            .set_format::<f32>();

        if config.channel_count.get() > 2 {
            warn!(
                "[OboeBackend] {} channels requested, rendering stereo",
                config.channel_count.get()
            );
        }

        if config.channel_count.get() == 1 {
            let stream = builder
                .set_channel_count::<oboe::Mono>()
                .set_callback(MonoToneCallback::new(tone))
                .open_stream()
                .map_err(open_failed)?;
            OboeStream::Mono(stream).start(config)
        } else {
            let stream = builder
                .set_channel_count::<oboe::Stereo>()
                .set_callback(StereoToneCallback::new(tone))
                .open_stream()
                .map_err(open_failed)?;
            OboeStream::Stereo(stream).start(config)
        }
    }
}

impl OutputStream for OboeStream {
    fn latency_supported(&self) -> bool {
        with_stream!(self, stream => stream.get_audio_api()) == oboe::AudioApi::AAudio
    }

    fn latency_millis(&mut self) -> Option<f64> {
        let result = with_stream!(self, stream => stream.calculate_latency_millis());
        // Oboe reports failure for streams that cannot measure; map to the
        // negative sentinel so the session shows "Unknown".
        Some(result.unwrap_or(-1.0))
    }
}

impl Drop for OboeStream {
    fn drop(&mut self) {
        let result = with_stream!(self, stream => stream.stop());
        if let Err(e) = result {
            warn!("[OboeBackend] stop failed: {:?}", e);
        }
    }
}
