//! Capture backends shipped with the core crate, plus checks shared by
//! every backend that writes PCM WAV.

use std::path::Path;

use crate::models::config::{AudioCodec, CaptureSettings};
use crate::models::error::RecordError;

pub mod tone;

/// Check that `settings` describe a PCM recording into a usable `path`.
///
/// Returns the sample rate rounded to whole Hz.
pub fn check_pcm_request(settings: &CaptureSettings, path: &Path) -> Result<u32, RecordError> {
    if settings.codec != AudioCodec::LinearPcm {
        return Err(RecordError::InitializationFailure(format!(
            "codec {:?} is not supported, only linear PCM",
            settings.codec
        )));
    }
    if settings.channels == 0 {
        return Err(RecordError::InitializationFailure("no channels requested".into()));
    }
    if !settings.sample_rate.is_finite()
        || settings.sample_rate < 1.0
        || settings.sample_rate > f64::from(u32::MAX)
    {
        return Err(RecordError::InitializationFailure(format!(
            "unsupported sample rate: {}",
            settings.sample_rate
        )));
    }
    match path.parent() {
        Some(dir) if dir.is_dir() && !path.is_dir() => Ok(settings.sample_rate.round() as u32),
        _ => Err(RecordError::InitializationFailure(format!(
            "invalid recording path: {}",
            path.display()
        ))),
    }
}
