use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::RecordError;

/// Container format of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Lossless compressed audio.
    Lossless,
    /// Uncompressed linear PCM.
    Wav,
}

impl AudioFormat {
    pub fn codec(self) -> AudioCodec {
        match self {
            Self::Lossless => AudioCodec::AppleLossless,
            Self::Wav => AudioCodec::LinearPcm,
        }
    }

    /// Extension given to session files recorded in this format.
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Lossless => "flac",
            Self::Wav => "wav",
        }
    }
}

/// Encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    Max,
    Medium,
}

impl AudioQuality {
    /// Numeric encoder quality level handed to the capture backend.
    pub fn level(self) -> u8 {
        match self {
            Self::Max => 0x7F,
            Self::Medium => 0x40,
        }
    }
}

/// Codec identifier a capture backend encodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    AppleLossless,
    LinearPcm,
}

impl AudioCodec {
    /// Four-character code of the codec (`'alac'`, `'lpcm'`).
    pub fn fourcc(self) -> u32 {
        match self {
            Self::AppleLossless => u32::from_be_bytes(*b"alac"),
            Self::LinearPcm => u32::from_be_bytes(*b"lpcm"),
        }
    }
}

/// Configuration of a record session. Immutable once the session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Encoder bit rate in bits per second (default: 192000).
    pub bit_rate: u32,

    /// Sample rate in Hz (default: 44100).
    pub sample_rate: f64,

    /// Number of recorded channels (default: 1).
    pub channels: u16,

    /// Output format (default: WAV).
    pub format: AudioFormat,

    /// Encoder quality (default: medium).
    pub quality: AudioQuality,
}

impl RecordConfig {
    pub const MAX_CHANNELS: u16 = 8;

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Err("sample rate must be positive".into());
        }
        if self.bit_rate == 0 {
            return Err("bit rate must be positive".into());
        }
        if self.channels == 0 || self.channels > Self::MAX_CHANNELS {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        Ok(())
    }

    /// Settings handed to the capture backend.
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            codec: self.format.codec(),
            encoder_quality: self.quality.level(),
            encoder_bit_rate: self.bit_rate,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        self.format.file_extension()
    }

    /// Parse a JSON config; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RecordError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecordError::InitializationFailure(format!("invalid config: {e}")))?;
        config.validate().map_err(RecordError::InitializationFailure)?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, RecordError> {
        let json = fs::read_to_string(path)
            .map_err(|e| RecordError::storage("failed to read config", e))?;
        Self::from_json_str(&json)
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            bit_rate: 192_000,
            sample_rate: 44_100.0,
            channels: 1,
            format: AudioFormat::Wav,
            quality: AudioQuality::Medium,
        }
    }
}

/// Settings a capture backend opens its resource with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub codec: AudioCodec,
    pub encoder_quality: u8,
    pub encoder_bit_rate: u32,
    pub channels: u16,
    pub sample_rate: f64,
}

/// Session tuning that is not part of the recording itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Directory session files are created in.
    pub storage_dir: PathBuf,

    /// Meter poller cadence (default: 16 ms, one tick per 60 Hz frame).
    pub meter_interval: Duration,
}

impl SessionOptions {
    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Default::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            storage_dir: crate::storage::files::default_storage_dir(),
            meter_interval: Duration::from_millis(16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_mono_wav() {
        let config = RecordConfig::default();
        assert_eq!(config.bit_rate, 192_000);
        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.channels, 1);
        assert_eq!(config.quality, AudioQuality::Medium);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn format_maps_to_codec_and_extension() {
        assert_eq!(AudioFormat::Lossless.file_extension(), "flac");
        assert_eq!(AudioFormat::Wav.file_extension(), "wav");
        assert_eq!(AudioFormat::Lossless.codec().fourcc(), 0x616c_6163);
        assert_eq!(AudioFormat::Wav.codec().fourcc(), 0x6c70_636d);
    }

    #[test]
    fn quality_levels() {
        assert_eq!(AudioQuality::Max.level(), 0x7F);
        assert_eq!(AudioQuality::Medium.level(), 0x40);
    }

    #[test]
    fn settings_carry_sample_rate_not_bit_rate() {
        let config = RecordConfig {
            bit_rate: 128_000,
            sample_rate: 48_000.0,
            channels: 2,
            format: AudioFormat::Lossless,
            quality: AudioQuality::Max,
        };
        let settings = config.capture_settings();

        assert_eq!(settings.sample_rate, 48_000.0);
        assert_eq!(settings.encoder_bit_rate, 128_000);
        assert_eq!(settings.channels, 2);
        assert_eq!(settings.codec, AudioCodec::AppleLossless);
        assert_eq!(settings.encoder_quality, 0x7F);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero_channels = RecordConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(zero_channels.validate().is_err());

        let negative_rate = RecordConfig {
            sample_rate: -1.0,
            ..Default::default()
        };
        assert!(negative_rate.validate().is_err());

        let nan_rate = RecordConfig {
            sample_rate: f64::NAN,
            ..Default::default()
        };
        assert!(nan_rate.validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = RecordConfig::from_json_str(r#"{"channels": 2, "format": "lossless"}"#).unwrap();
        assert_eq!(config.channels, 2);
        assert_eq!(config.format, AudioFormat::Lossless);
        assert_eq!(config.sample_rate, 44_100.0);
    }

    #[test]
    fn json_rejects_invalid_config() {
        let err = RecordConfig::from_json_str(r#"{"channels": 0}"#).unwrap_err();
        assert!(matches!(err, RecordError::InitializationFailure(_)));
    }
}
