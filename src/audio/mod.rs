// Audio module - playback session, selector tables and test tone

#[cfg(target_os = "android")]
pub mod callback;
pub mod options;
pub mod session;
pub mod tone;

pub use options::{
    option_tables, AudioApi, BufferSizeOption, ChannelCount, OptionEntry, OptionTables,
    OutputDevice, StreamConfig, AUDIO_API_OPTIONS, BUFFER_SIZE_OPTIONS,
};
pub use session::{AudioEngineSession, LatencyProbe, LatencyReading};
pub use tone::{ToneOscillator, ToneState};
