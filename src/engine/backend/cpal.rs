//! CPAL-based playback backend for desktop platforms (Linux, macOS, Windows)
//!
//! Desktop hosts have no notion of Oboe's audio API selection or burst
//! queries, so the API selector is logged and ignored and buffer sizes are
//! derived from a fixed burst length. Latency is not measurable here.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, warn};

use super::stream_thread::{OutputStream, OutputStreamDriver, StreamThreadBackend};
use crate::audio::{OutputDevice, StreamConfig, ToneOscillator, ToneState};
use crate::error::AudioError;

/// Frames per burst assumed when translating the burst selector.
pub const DESKTOP_FRAMES_PER_BURST: u32 = 192;

/// Desktop backend driving a CPAL output stream on its owner thread.
pub type CpalBackend = StreamThreadBackend<CpalDriver>;

pub struct CpalDriver;

pub struct CpalStream {
    _stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn latency_supported(&self) -> bool {
        false
    }

    fn latency_millis(&mut self) -> Option<f64> {
        None
    }
}

fn unavailable(reason: String) -> AudioError {
    AudioError::EngineUnavailable { reason }
}

fn select_device(host: &cpal::Host, output: OutputDevice) -> Result<cpal::Device, AudioError> {
    if let OutputDevice::Id(id) = output {
        // Desktop hosts have no stable numeric ids; use 1-based enumeration order.
        let found = host
            .output_devices()
            .ok()
            .and_then(|mut devices| devices.nth((id as usize).saturating_sub(1)));
        match found {
            Some(device) => return Ok(device),
            None => warn!("[CpalBackend] Output device {} not found, using default", id),
        }
    }
    host.default_output_device()
        .ok_or_else(|| unavailable("No default output device found".to_string()))
}

impl OutputStreamDriver for CpalDriver {
    type Stream = CpalStream;
    const NAME: &'static str = "CpalBackend";

    fn open(config: &StreamConfig, tone: Arc<ToneState>) -> Result<CpalStream, AudioError> {
        debug!(
            "[CpalBackend] Audio API {} has no desktop equivalent, ignoring",
            config.audio_api.label()
        );
        let host = cpal::default_host();
        let device = select_device(&host, config.output_device)?;

        let default_config = device
            .default_output_config()
            .map_err(|e| unavailable(format!("Failed to get default output config: {:?}", e)))?;
        if default_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(unavailable(
                "Only F32 sample format is currently supported for output".to_string(),
            ));
        }

        let sample_rate = default_config.sample_rate();
        let channels = config.channel_count.get() as u16;
        let bursts = config.buffer_size.bursts();
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: if bursts == 0 {
                cpal::BufferSize::Default
            } else {
                cpal::BufferSize::Fixed(bursts * DESKTOP_FRAMES_PER_BURST)
            },
        };

        let mut oscillator = ToneOscillator::new(tone, sample_rate.0);
        let channel_count = channels as usize;
        let err_fn = |err| error!("[CpalBackend] Output stream error: {}", err);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    oscillator.fill_interleaved(data, channel_count);
                },
                err_fn,
                None,
            )
            .map_err(|e| unavailable(format!("{:?}", e)))?;

        stream
            .play()
            .map_err(|e| unavailable(format!("Failed to start output stream: {:?}", e)))?;

        Ok(CpalStream { _stream: stream })
    }
}
