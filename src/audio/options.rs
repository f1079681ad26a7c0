//! Typed selector values for the playback stream.
//!
//! Each selector is a small enum (or validated newtype) backed by a static
//! table mapping the value to its display label and numeric value, so a
//! selection can never fail to parse at runtime.

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Number of output channels, validated to `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelCount(u8);

impl ChannelCount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;
    pub const MONO: ChannelCount = ChannelCount(1);
    pub const STEREO: ChannelCount = ChannelCount(2);

    pub fn new(count: u8) -> Result<Self, AudioError> {
        if (Self::MIN..=Self::MAX).contains(&count) {
            Ok(Self(count))
        } else {
            Err(AudioError::InvalidConfiguration {
                field: "channel_count",
                value: count as i64,
            })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All selectable channel counts in display order.
    pub fn options() -> impl Iterator<Item = ChannelCount> {
        (Self::MIN..=Self::MAX).map(ChannelCount)
    }
}

impl Default for ChannelCount {
    fn default() -> Self {
        Self::STEREO
    }
}

impl TryFrom<u8> for ChannelCount {
    type Error = AudioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelCount> for u8 {
    fn from(value: ChannelCount) -> Self {
        value.0
    }
}

/// Buffer size expressed in bursts; `Automatic` lets the engine decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BufferSizeOption {
    #[default]
    Automatic,
    One,
    Two,
    Four,
    Eight,
}

/// Buffer size selector table, in display order.
pub const BUFFER_SIZE_OPTIONS: [BufferSizeOption; 5] = [
    BufferSizeOption::Automatic,
    BufferSizeOption::One,
    BufferSizeOption::Two,
    BufferSizeOption::Four,
    BufferSizeOption::Eight,
];

impl BufferSizeOption {
    pub fn bursts(self) -> u32 {
        match self {
            BufferSizeOption::Automatic => 0,
            BufferSizeOption::One => 1,
            BufferSizeOption::Two => 2,
            BufferSizeOption::Four => 4,
            BufferSizeOption::Eight => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferSizeOption::Automatic => "Automatic",
            BufferSizeOption::One => "1",
            BufferSizeOption::Two => "2",
            BufferSizeOption::Four => "4",
            BufferSizeOption::Eight => "8",
        }
    }

    pub fn from_bursts(bursts: u32) -> Result<Self, AudioError> {
        BUFFER_SIZE_OPTIONS
            .iter()
            .copied()
            .find(|option| option.bursts() == bursts)
            .ok_or(AudioError::InvalidConfiguration {
                field: "buffer_size_bursts",
                value: bursts as i64,
            })
    }
}

impl TryFrom<u32> for BufferSizeOption {
    type Error = AudioError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_bursts(value)
    }
}

impl From<BufferSizeOption> for u32 {
    fn from(value: BufferSizeOption) -> Self {
        value.bursts()
    }
}

/// Native audio API requested for the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AudioApi {
    #[default]
    Unspecified,
    OpenSlEs,
    AAudio,
}

/// Audio API selector table, in display order. Position equals the numeric id.
pub const AUDIO_API_OPTIONS: [AudioApi; 3] =
    [AudioApi::Unspecified, AudioApi::OpenSlEs, AudioApi::AAudio];

impl AudioApi {
    pub fn id(self) -> u8 {
        match self {
            AudioApi::Unspecified => 0,
            AudioApi::OpenSlEs => 1,
            AudioApi::AAudio => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AudioApi::Unspecified => "Unspecified",
            AudioApi::OpenSlEs => "OpenSL ES",
            AudioApi::AAudio => "AAudio",
        }
    }

    pub fn from_id(id: u8) -> Result<Self, AudioError> {
        AUDIO_API_OPTIONS
            .get(id as usize)
            .copied()
            .ok_or(AudioError::InvalidConfiguration {
                field: "audio_api",
                value: id as i64,
            })
    }
}

impl TryFrom<u8> for AudioApi {
    type Error = AudioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_id(value)
    }
}

impl From<AudioApi> for u8 {
    fn from(value: AudioApi) -> Self {
        value.id()
    }
}

/// Output device selection. Device id 0 means "let the platform choose".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDevice {
    #[default]
    Default,
    Id(i32),
}

impl OutputDevice {
    pub fn from_id(id: i32) -> Result<Self, AudioError> {
        match id {
            0 => Ok(OutputDevice::Default),
            id if id > 0 => Ok(OutputDevice::Id(id)),
            id => Err(AudioError::InvalidConfiguration {
                field: "output_device",
                value: id as i64,
            }),
        }
    }

    pub fn id(self) -> i32 {
        match self {
            OutputDevice::Default => 0,
            OutputDevice::Id(id) => id,
        }
    }
}

/// Full stream configuration applied when the engine is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub channel_count: ChannelCount,
    #[serde(default)]
    pub buffer_size: BufferSizeOption,
    #[serde(default)]
    pub audio_api: AudioApi,
    #[serde(default)]
    pub output_device: OutputDevice,
}

/// One row of a selector table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionEntry {
    pub label: String,
    pub value: i64,
}

/// All selector tables, as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct OptionTables {
    pub channel_counts: Vec<OptionEntry>,
    pub buffer_sizes: Vec<OptionEntry>,
    pub audio_apis: Vec<OptionEntry>,
}

pub fn option_tables() -> OptionTables {
    OptionTables {
        channel_counts: ChannelCount::options()
            .map(|count| OptionEntry {
                label: count.get().to_string(),
                value: count.get() as i64,
            })
            .collect(),
        buffer_sizes: BUFFER_SIZE_OPTIONS
            .iter()
            .map(|option| OptionEntry {
                label: option.label().to_string(),
                value: option.bursts() as i64,
            })
            .collect(),
        audio_apis: AUDIO_API_OPTIONS
            .iter()
            .map(|api| OptionEntry {
                label: api.label().to_string(),
                value: api.id() as i64,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_rejects_out_of_range() {
        assert!(ChannelCount::new(0).is_err());
        assert!(ChannelCount::new(9).is_err());
        assert_eq!(ChannelCount::new(8).unwrap().get(), 8);
        assert_eq!(ChannelCount::default(), ChannelCount::STEREO);
        assert_eq!(ChannelCount::options().count(), 8);
    }

    #[test]
    fn buffer_size_table_matches_bursts() {
        let bursts: Vec<u32> = BUFFER_SIZE_OPTIONS.iter().map(|o| o.bursts()).collect();
        assert_eq!(bursts, vec![0, 1, 2, 4, 8]);
        assert_eq!(BufferSizeOption::Automatic.label(), "Automatic");
        assert_eq!(
            BufferSizeOption::from_bursts(4).unwrap(),
            BufferSizeOption::Four
        );
        assert!(matches!(
            BufferSizeOption::from_bursts(3),
            Err(AudioError::InvalidConfiguration { value: 3, .. })
        ));
    }

    #[test]
    fn audio_api_ids_follow_table_position() {
        for (index, api) in AUDIO_API_OPTIONS.iter().enumerate() {
            assert_eq!(api.id() as usize, index);
            assert_eq!(AudioApi::from_id(index as u8).unwrap(), *api);
        }
        assert_eq!(AudioApi::OpenSlEs.label(), "OpenSL ES");
        assert!(AudioApi::from_id(3).is_err());
    }

    #[test]
    fn output_device_zero_is_default() {
        assert_eq!(OutputDevice::from_id(0).unwrap(), OutputDevice::Default);
        assert_eq!(OutputDevice::from_id(7).unwrap(), OutputDevice::Id(7));
        assert!(OutputDevice::from_id(-2).is_err());
    }

    #[test]
    fn stream_config_deserializes_with_validation() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"channel_count":1,"buffer_size":2,"audio_api":2}"#).unwrap();
        assert_eq!(config.channel_count, ChannelCount::MONO);
        assert_eq!(config.buffer_size, BufferSizeOption::Two);
        assert_eq!(config.audio_api, AudioApi::AAudio);
        assert_eq!(config.output_device, OutputDevice::Default);

        let invalid = serde_json::from_str::<StreamConfig>(r#"{"channel_count":12}"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn option_tables_expose_labels() {
        let tables = option_tables();
        assert_eq!(tables.channel_counts[1].value, 2);
        assert_eq!(tables.buffer_sizes[0].label, "Automatic");
        assert_eq!(tables.audio_apis[2].label, "AAudio");
    }
}
