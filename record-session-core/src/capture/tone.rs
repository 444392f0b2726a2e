//! Synthetic capture backend.
//!
//! Records a generated sine tone instead of a microphone, paced in real
//! time. Used for tests and demos on machines without an input device, and
//! able to inject failures at every stage of the resource lifecycle.

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::CaptureSettings;
use crate::models::error::RecordError;
use crate::processing::levels::SharedLevelMeter;
use crate::storage::wav_writer::WavFileWriter;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{CaptureBackend, CaptureResource, LevelMeter};

/// Behaviour of the synthetic backend.
#[derive(Debug, Clone)]
pub struct ToneOptions {
    /// Tone frequency in Hz (default: 440).
    pub frequency_hz: f64,

    /// Peak amplitude of the first channel (default: 0.5). Channel `n` is
    /// attenuated by `1 / (n + 1)` so each channel meters differently.
    pub amplitude: f32,

    /// Audio generated per capture tick (default: 10 ms).
    pub chunk: Duration,

    /// Time `prepare_to_record` blocks for (default: none).
    pub prepare_delay: Duration,

    /// Fail `open` with this error.
    pub open_error: Option<RecordError>,

    /// Fail `prepare_to_record` with this error.
    pub prepare_error: Option<RecordError>,

    /// Fail `record` with this error.
    pub record_error: Option<RecordError>,

    /// Report an encoder fault once this much audio has been captured.
    pub fail_after: Option<Duration>,

    /// Finish on its own once this much audio has been captured.
    pub stop_after: Option<Duration>,
}

impl Default for ToneOptions {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            amplitude: 0.5,
            chunk: Duration::from_millis(10),
            prepare_delay: Duration::ZERO,
            open_error: None,
            prepare_error: None,
            record_error: None,
            fail_after: None,
            stop_after: None,
        }
    }
}

/// Lifecycle counters, shared by a backend and every resource it opened.
#[derive(Debug, Default)]
pub struct ToneStats {
    opened: AtomicUsize,
    prepared: AtomicUsize,
    released: AtomicUsize,
}

impl ToneStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    /// Resources dropped so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Backend producing [`ToneResource`]s. Writes 16-bit PCM WAV only.
#[derive(Debug, Default)]
pub struct ToneBackend {
    options: ToneOptions,
    stats: Arc<ToneStats>,
}

impl ToneBackend {
    pub fn new(options: ToneOptions) -> Self {
        Self {
            options,
            stats: Arc::new(ToneStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ToneStats> {
        Arc::clone(&self.stats)
    }
}

impl CaptureBackend for ToneBackend {
    type Resource = ToneResource;

    fn open(&self, settings: &CaptureSettings, path: &Path) -> Result<ToneResource, RecordError> {
        if let Some(error) = &self.options.open_error {
            return Err(error.clone());
        }
        let sample_rate = super::check_pcm_request(settings, path)?;

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ToneResource {
            path: path.to_path_buf(),
            channels: settings.channels,
            sample_rate,
            options: self.options.clone(),
            stats: Arc::clone(&self.stats),
            meter: Arc::new(SharedLevelMeter::new(settings.channels as usize)),
            writer: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }
}

/// One synthetic capture: a tone generator thread writing into a WAV file.
pub struct ToneResource {
    path: PathBuf,
    channels: u16,
    sample_rate: u32,
    options: ToneOptions,
    stats: Arc<ToneStats>,
    meter: Arc<SharedLevelMeter>,
    writer: Arc<Mutex<Option<WavFileWriter>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureResource for ToneResource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn prepare_to_record(&mut self) -> Result<(), RecordError> {
        if !self.options.prepare_delay.is_zero() {
            thread::sleep(self.options.prepare_delay);
        }
        if let Some(error) = &self.options.prepare_error {
            return Err(error.clone());
        }

        let writer = WavFileWriter::create(&self.path, self.channels, self.sample_rate)?;
        *self.writer.lock() = Some(writer);
        self.stats.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn enable_metering(&mut self) {
        self.meter.enable_metering();
    }

    fn meter(&self) -> Arc<dyn LevelMeter> {
        Arc::clone(&self.meter) as Arc<dyn LevelMeter>
    }

    fn record(&mut self, delegate: Arc<dyn CaptureDelegate>) -> Result<(), RecordError> {
        if let Some(error) = &self.options.record_error {
            return Err(error.clone());
        }
        if self.writer.lock().is_none() {
            return Err(RecordError::InitializationFailure("resource is not prepared".into()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.meter.set_active(true);

        let generator = ToneGenerator {
            channels: self.channels as usize,
            sample_rate: f64::from(self.sample_rate),
            frequency_hz: self.options.frequency_hz,
            amplitude: self.options.amplitude,
            frame: 0,
        };
        let capture = ToneCapture {
            generator,
            options: self.options.clone(),
            meter: Arc::clone(&self.meter),
            writer: Arc::clone(&self.writer),
            running: Arc::clone(&self.running),
            delegate,
        };

        let handle = thread::Builder::new()
            .name("tone-capture".into())
            .spawn(move || capture.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                self.meter.set_active(false);
                RecordError::InitializationFailure(format!("failed to spawn capture thread: {e}"))
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.meter.set_active(false);

        if let Some(mut writer) = self.writer.lock().take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl Drop for ToneResource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("failed to stop tone capture: {}", e);
        }
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct ToneGenerator {
    channels: usize,
    sample_rate: f64,
    frequency_hz: f64,
    amplitude: f32,
    frame: u64,
}

impl ToneGenerator {
    /// Next `frames` interleaved frames.
    fn next_chunk(&mut self, frames: usize) -> Vec<f32> {
        let mut samples = Vec::with_capacity(frames * self.channels);
        for _ in 0..frames {
            let t = self.frame as f64 / self.sample_rate;
            let value = (TAU * self.frequency_hz * t).sin() as f32 * self.amplitude;
            for ch in 0..self.channels {
                samples.push(value / (ch + 1) as f32);
            }
            self.frame += 1;
        }
        samples
    }
}

/// Body of the capture thread.
struct ToneCapture {
    generator: ToneGenerator,
    options: ToneOptions,
    meter: Arc<SharedLevelMeter>,
    writer: Arc<Mutex<Option<WavFileWriter>>>,
    running: Arc<AtomicBool>,
    delegate: Arc<dyn CaptureDelegate>,
}

impl ToneCapture {
    fn run(mut self) {
        let frames_per_chunk =
            ((self.generator.sample_rate * self.options.chunk.as_secs_f64()) as usize).max(1);
        let started = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            thread::sleep(self.options.chunk);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if self.options.fail_after.is_some_and(|after| started.elapsed() >= after) {
                self.halt();
                self.delegate
                    .on_encode_error(Some(RecordError::Encoding("synthetic encoder fault".into())));
                return;
            }

            let samples = self.generator.next_chunk(frames_per_chunk);
            self.meter.accumulate(&samples);
            let written = match self.writer.lock().as_mut() {
                Some(writer) => writer.write_samples(&samples),
                None => Ok(()),
            };
            if let Err(e) = written {
                self.halt();
                self.delegate.on_encode_error(Some(e));
                return;
            }

            if self.options.stop_after.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
        }

        self.halt();
        let finalized = match self.writer.lock().as_mut() {
            Some(writer) => writer.finalize(),
            None => Ok(()),
        };
        match finalized {
            Ok(()) => self.delegate.on_capture_finished(true),
            Err(e) => self.delegate.on_encode_error(Some(e)),
        }
    }

    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.meter.set_active(false);
    }
}
