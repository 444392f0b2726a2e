//! Input device lookup and stream configuration via cpal.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};
use thiserror::Error;

use record_session_core::RecordError;

/// Device-level failures. Every one of them means the session cannot start.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device available")]
    NoDevice,

    #[error("input device not found: {0}")]
    NotFound(String),

    #[error("failed to query input configuration: {0}")]
    Config(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to open input stream: {0}")]
    Stream(String),
}

impl From<DeviceError> for RecordError {
    fn from(err: DeviceError) -> Self {
        RecordError::InitializationFailure(err.to_string())
    }
}

/// Names of the input devices of the default host.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// The named input device, or the host default when `name` is `None`.
pub fn find_input_device(name: Option<&str>) -> Result<Device, DeviceError> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host.default_input_device().ok_or(DeviceError::NoDevice);
    };

    host.input_devices()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| DeviceError::NotFound(name.to_owned()))
}

/// Stream configuration closest to the request.
///
/// A configuration running at exactly `sample_rate` is preferred; without
/// one, the device default is used and the recording keeps the device rate.
pub fn select_config(
    device: &Device,
    channels: u16,
    sample_rate: u32,
) -> Result<SupportedStreamConfig, DeviceError> {
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .collect();

    if let Some(config) = pick_config(&ranges, channels, sample_rate) {
        return Ok(config);
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;
    if !is_convertible(fallback.sample_format()) {
        return Err(DeviceError::UnsupportedFormat(format!(
            "{:?}",
            fallback.sample_format()
        )));
    }
    log::warn!(
        "{} Hz not supported by input device, recording at {} Hz",
        sample_rate,
        fallback.sample_rate().0
    );
    Ok(fallback)
}

/// Pick a range covering `sample_rate`, preferring the requested channel
/// count and then float samples.
pub(crate) fn pick_config(
    ranges: &[SupportedStreamConfigRange],
    channels: u16,
    sample_rate: u32,
) -> Option<SupportedStreamConfig> {
    let rate = SampleRate(sample_rate);
    ranges
        .iter()
        .filter(|range| is_convertible(range.sample_format()))
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .min_by_key(|range| {
            (
                range.channels() != channels,
                range.sample_format() != SampleFormat::F32,
            )
        })
        .map(|range| range.clone().with_sample_rate(rate))
}

/// Sample formats the capture callback converts to `f32`.
pub(crate) fn is_convertible(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}
