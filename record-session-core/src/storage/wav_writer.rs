use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::models::error::RecordError;

/// Bit depth of every WAV file written by the shipped backends.
pub const PCM_BIT_DEPTH: u16 = 16;

/// Streaming 16-bit PCM WAV writer.
///
/// Wrap in a `Mutex` when shared with a capture callback.
///
/// ## File Format
/// ```text
/// [44-byte RIFF header, sizes patched on finalize]
/// [interleaved little-endian i16 frames...]
/// ```
pub struct WavFileWriter {
    file_path: PathBuf,
    channels: u16,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl WavFileWriter {
    /// Create the file (and its parent directory) and write the header.
    pub fn create(file_path: &Path, channels: u16, sample_rate: u32) -> Result<Self, RecordError> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RecordError::storage("failed to create directory", e))?;
        }

        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: PCM_BIT_DEPTH,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(file_path, spec)
            .map_err(|e| RecordError::storage("failed to create file", e))?;

        Ok(Self {
            file_path: file_path.to_path_buf(),
            channels,
            writer: Some(writer),
            frames_written: 0,
        })
    }

    /// Append interleaved f32 samples in `[-1.0, 1.0]`; out-of-range values clip.
    pub fn write_samples(&mut self, interleaved: &[f32]) -> Result<(), RecordError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RecordError::Storage("file is not open for writing".into()))?;

        for &sample in interleaved {
            writer.write_sample(to_i16(sample))?;
        }
        self.frames_written += (interleaved.len() / self.channels.max(1) as usize) as u64;
        Ok(())
    }

    /// Patch the header sizes and close the file. Later calls are no-ops.
    pub fn finalize(&mut self) -> Result<(), RecordError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            log::debug!(
                "finalized {} ({} frames)",
                self.file_path.display(),
                self.frames_written
            );
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
