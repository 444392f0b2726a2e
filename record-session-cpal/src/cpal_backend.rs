//! Microphone capture resource on top of a cpal input stream.
//!
//! The cpal stream is not `Send`, so it is built, played and dropped on a
//! dedicated capture thread. That thread is spawned while preparing: it
//! resolves the device, builds the stream and then parks until `record`
//! tells it to play. The audio callback only converts samples to `f32` and
//! pushes them into a ring buffer. The capture thread drains the buffer every
//! tick, remaps channels, feeds the level meter and appends to the WAV file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::*;
use ringbuf::{HeapCons, HeapProd, HeapRb};

use record_session_core::capture::check_pcm_request;
use record_session_core::processing::channel_map::remap_channels;
use record_session_core::processing::levels::SharedLevelMeter;
use record_session_core::{
    CaptureBackend, CaptureDelegate, CaptureResource, CaptureSettings, LevelMeter, RecordError,
    WavFileWriter,
};

use crate::device::{self, DeviceError};

/// How often the capture thread drains audio and checks for faults.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(20);

/// Seconds of device audio the ring buffer holds.
const RING_SECONDS: usize = 2;

/// Frames moved out of the ring buffer per pop.
const DRAIN_FRAMES: usize = 1024;

/// Opens microphone captures on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Capture from the host's default input device.
    pub fn default_device() -> Self {
        Self::default()
    }

    /// Capture from the input device with this name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl CaptureBackend for CpalBackend {
    type Resource = CpalResource;

    fn open(&self, settings: &CaptureSettings, path: &Path) -> Result<CpalResource, RecordError> {
        let sample_rate = check_pcm_request(settings, path)?;

        Ok(CpalResource {
            path: path.to_path_buf(),
            device_name: self.device_name.clone(),
            channels: settings.channels,
            sample_rate,
            meter: Arc::new(SharedLevelMeter::new(settings.channels as usize)),
            writer: Arc::new(Mutex::new(None)),
            fault: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            play_tx: None,
            handle: None,
        })
    }
}

/// One microphone capture into a WAV file.
pub struct CpalResource {
    path: PathBuf,
    device_name: Option<String>,
    channels: u16,
    sample_rate: u32,
    meter: Arc<SharedLevelMeter>,
    writer: Arc<Mutex<Option<WavFileWriter>>>,
    fault: Arc<Mutex<Option<RecordError>>>,
    running: Arc<AtomicBool>,
    /// Wakes the parked capture thread. Dropping it stops the thread.
    play_tx: Option<mpsc::Sender<Arc<dyn CaptureDelegate>>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureResource for CpalResource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn prepare_to_record(&mut self) -> Result<(), RecordError> {
        if self.play_tx.is_some() {
            return Ok(());
        }

        let capture = CpalCapture {
            device_name: self.device_name.clone(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            meter: Arc::clone(&self.meter),
            writer: Arc::clone(&self.writer),
            fault: Arc::clone(&self.fault),
            running: Arc::clone(&self.running),
        };
        let (ready_tx, ready_rx) = mpsc::channel();
        let (play_tx, play_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || capture.run(ready_tx, play_rx))
            .map_err(|e| {
                RecordError::InitializationFailure(format!("failed to spawn capture thread: {e}"))
            })?;

        // The stream is built on the capture thread; wait until it exists.
        let opened = ready_rx.recv().unwrap_or(Err(RecordError::Unknown));
        let created = opened.and_then(|device_rate| {
            WavFileWriter::create(&self.path, self.channels, device_rate)
        });
        match created {
            Ok(writer) => {
                *self.writer.lock() = Some(writer);
                self.play_tx = Some(play_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                drop(play_tx);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn enable_metering(&mut self) {
        self.meter.enable_metering();
    }

    fn meter(&self) -> Arc<dyn LevelMeter> {
        Arc::clone(&self.meter) as Arc<dyn LevelMeter>
    }

    fn record(&mut self, delegate: Arc<dyn CaptureDelegate>) -> Result<(), RecordError> {
        let Some(play_tx) = &self.play_tx else {
            return Err(RecordError::InitializationFailure(
                "resource is not prepared".into(),
            ));
        };
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.fault.lock() = None;
        self.meter.set_active(true);

        if play_tx.send(delegate).is_err() {
            self.halt();
            return Err(RecordError::InitializationFailure(
                "capture thread has exited".into(),
            ));
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        self.halt();
        self.play_tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Some(mut writer) = self.writer.lock().take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl CpalResource {
    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.meter.set_active(false);
    }
}

impl Drop for CpalResource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("failed to stop microphone capture: {}", e);
        }
    }
}

/// Audio-callback side of the ring buffer. Never blocks or allocates.
struct Feed {
    producer: HeapProd<f32>,
    overruns: Arc<AtomicU64>,
}

impl Feed {
    /// Push a whole callback buffer, or drop it when the ring is full so
    /// interleaved frames stay aligned.
    fn push<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> f32) {
        if self.producer.vacant_len() < data.len() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return;
        }
        for &sample in data {
            let _ = self.producer.try_push(convert(sample));
        }
    }
}

/// Capture-thread side of the ring buffer.
struct Drain {
    consumer: HeapCons<f32>,
    scratch: Vec<f32>,
    device_channels: usize,
    channels: usize,
    meter: Arc<SharedLevelMeter>,
    writer: Arc<Mutex<Option<WavFileWriter>>>,
    overruns: Arc<AtomicU64>,
    reported_overruns: u64,
}

impl Drain {
    fn new(
        consumer: HeapCons<f32>,
        device_channels: usize,
        channels: usize,
        meter: Arc<SharedLevelMeter>,
        writer: Arc<Mutex<Option<WavFileWriter>>>,
        overruns: Arc<AtomicU64>,
    ) -> Self {
        Self {
            consumer,
            scratch: vec![0.0; device_channels.max(1) * DRAIN_FRAMES],
            device_channels,
            channels,
            meter,
            writer,
            overruns,
            reported_overruns: 0,
        }
    }

    /// Move everything buffered so far into the meter and the file.
    fn drain(&mut self) -> Result<(), RecordError> {
        self.report_overruns();
        loop {
            let popped = self.consumer.pop_slice(&mut self.scratch);
            if popped == 0 {
                return Ok(());
            }
            let samples = remap_channels(&self.scratch[..popped], self.device_channels, self.channels);
            self.meter.accumulate(&samples);
            if let Some(writer) = self.writer.lock().as_mut() {
                writer.write_samples(&samples)?;
            }
        }
    }

    fn report_overruns(&mut self) {
        let overruns = self.overruns.load(Ordering::Relaxed);
        if overruns > self.reported_overruns {
            log::warn!(
                "dropped {} input buffers, capture thread fell behind",
                overruns - self.reported_overruns
            );
            self.reported_overruns = overruns;
        }
    }
}

/// Keep the first fault; the capture thread reports it.
fn keep_first_fault(fault: &Mutex<Option<RecordError>>, error: RecordError) {
    let mut fault = fault.lock();
    if fault.is_none() {
        *fault = Some(error);
    }
}

/// Body of the capture thread.
struct CpalCapture {
    device_name: Option<String>,
    channels: u16,
    sample_rate: u32,
    meter: Arc<SharedLevelMeter>,
    writer: Arc<Mutex<Option<WavFileWriter>>>,
    fault: Arc<Mutex<Option<RecordError>>>,
    running: Arc<AtomicBool>,
}

impl CpalCapture {
    fn run(
        self,
        ready: mpsc::Sender<Result<u32, RecordError>>,
        play: mpsc::Receiver<Arc<dyn CaptureDelegate>>,
    ) {
        let (stream, mut drain, device_rate) = match self.open_stream() {
            Ok(opened) => opened,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(device_rate));

        // Parked until the session records. A dropped sender means stop.
        let Ok(delegate) = play.recv() else {
            return;
        };
        if let Err(e) = stream.play() {
            self.halt();
            let error = RecordError::from(DeviceError::Stream(e.to_string()));
            log::error!("failed to start microphone stream: {}", error);
            delegate.on_encode_error(Some(error));
            return;
        }
        log::info!("microphone capture started");

        loop {
            match play.recv_timeout(SUPERVISE_INTERVAL) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let fault = match drain.drain() {
                Ok(()) => self.fault.lock().take(),
                Err(e) => Some(e),
            };
            if let Some(error) = fault {
                drop(stream);
                self.halt();
                log::error!("microphone capture failed: {}", error);
                delegate.on_encode_error(Some(error));
                return;
            }
        }

        drop(stream);
        self.halt();
        log::info!("microphone capture stopped");

        let finalized = drain.drain().and_then(|()| match self.writer.lock().as_mut() {
            Some(writer) => writer.finalize(),
            None => Ok(()),
        });
        match finalized {
            Ok(()) => delegate.on_capture_finished(true),
            Err(e) => delegate.on_encode_error(Some(e)),
        }
    }

    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.meter.set_active(false);
    }

    /// Resolve the device and build a paused stream feeding a fresh ring.
    fn open_stream(&self) -> Result<(Stream, Drain, u32), RecordError> {
        let device = device::find_input_device(self.device_name.as_deref())?;
        let supported = device::select_config(&device, self.channels, self.sample_rate)?;
        log::info!(
            "input device {:?}: {} Hz, {} ch, {:?}",
            device.name().ok(),
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        let config = supported.config();
        let device_channels = config.channels as usize;
        let capacity = (config.sample_rate.0 as usize * device_channels * RING_SECONDS)
            .max(device_channels * DRAIN_FRAMES);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let overruns = Arc::new(AtomicU64::new(0));
        let feed = Feed {
            producer,
            overruns: Arc::clone(&overruns),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32, _>(&device, &config, feed, &self.fault, |s| s)?,
            SampleFormat::I16 => {
                build_stream::<i16, _>(&device, &config, feed, &self.fault, i16_to_f32)?
            }
            SampleFormat::U16 => {
                build_stream::<u16, _>(&device, &config, feed, &self.fault, u16_to_f32)?
            }
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}")).into()),
        };

        let drain = Drain::new(
            consumer,
            device_channels,
            self.channels as usize,
            Arc::clone(&self.meter),
            Arc::clone(&self.writer),
            overruns,
        );
        Ok((stream, drain, config.sample_rate.0))
    }
}

fn build_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    mut feed: Feed,
    fault: &Arc<Mutex<Option<RecordError>>>,
    convert: F,
) -> Result<Stream, DeviceError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let error_fault = Arc::clone(fault);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| feed.push(data, &convert),
            move |err| {
                keep_first_fault(
                    &error_fault,
                    RecordError::Encoding(format!("input stream error: {err}")),
                );
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

fn u16_to_f32(sample: u16) -> f32 {
    (sample as f32 - 32_768.0) / 32_768.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_session_core::{AudioFormat, RecordConfig};
    use tempfile::TempDir;

    struct Ignore;
    impl CaptureDelegate for Ignore {
        fn on_capture_finished(&self, _successfully: bool) {}
        fn on_encode_error(&self, _error: Option<RecordError>) {}
    }

    #[test]
    fn open_rejects_lossless() {
        let tmp = TempDir::new().unwrap();
        let settings = RecordConfig {
            format: AudioFormat::Lossless,
            ..Default::default()
        }
        .capture_settings();

        let result = CpalBackend::default_device().open(&settings, &tmp.path().join("a.flac"));
        assert!(matches!(result, Err(RecordError::InitializationFailure(_))));
    }

    #[test]
    fn open_rejects_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let settings = RecordConfig::default().capture_settings();
        let path = tmp.path().join("gone").join("a.wav");

        assert!(CpalBackend::default_device().open(&settings, &path).is_err());
    }

    #[test]
    fn open_touches_neither_device_nor_file() {
        let tmp = TempDir::new().unwrap();
        let settings = RecordConfig::default().capture_settings();
        let path = tmp.path().join("a.wav");

        let resource = CpalBackend::with_device("does not exist")
            .open(&settings, &path)
            .unwrap();
        assert!(!resource.is_recording());
        assert!(!path.exists());
    }

    #[test]
    fn record_requires_prepare() {
        let tmp = TempDir::new().unwrap();
        let settings = RecordConfig::default().capture_settings();
        let mut resource = CpalBackend::default_device()
            .open(&settings, &tmp.path().join("a.wav"))
            .unwrap();

        assert!(matches!(
            resource.record(Arc::new(Ignore)),
            Err(RecordError::InitializationFailure(_))
        ));
    }

    #[test]
    fn prepare_on_unknown_device_fails_without_file_or_thread() {
        let tmp = TempDir::new().unwrap();
        let settings = RecordConfig::default().capture_settings();
        let path = tmp.path().join("a.wav");
        let mut resource = CpalBackend::with_device("does not exist")
            .open(&settings, &path)
            .unwrap();

        assert!(matches!(
            resource.prepare_to_record(),
            Err(RecordError::InitializationFailure(_))
        ));
        assert!(resource.handle.is_none());
        assert!(!path.exists());
        assert!(resource.record(Arc::new(Ignore)).is_err());
        assert!(!resource.is_recording());
    }

    #[test]
    fn drain_remaps_meters_and_writes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drain.wav");
        let meter = Arc::new(SharedLevelMeter::new(1));
        meter.enable_metering();
        let writer = Arc::new(Mutex::new(Some(WavFileWriter::create(&path, 1, 48_000).unwrap())));
        let (mut producer, consumer) = HeapRb::<f32>::new(64).split();
        let mut drain = Drain::new(
            consumer,
            2,
            1,
            Arc::clone(&meter),
            Arc::clone(&writer),
            Arc::new(AtomicU64::new(0)),
        );

        producer.push_slice(&[0.5, 0.5, -0.5, -0.5]);
        drain.drain().unwrap();
        assert_eq!(writer.lock().as_ref().unwrap().frames_written(), 2);
        let powers = meter.average_powers();
        assert_eq!(powers.len(), 1);
        assert!((powers[0] + 6.02).abs() < 0.01);

        drain.drain().unwrap();
        assert_eq!(writer.lock().as_ref().unwrap().frames_written(), 2);
    }

    #[test]
    fn drain_moves_more_than_one_scratch_buffer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("long.wav");
        let writer = Arc::new(Mutex::new(Some(WavFileWriter::create(&path, 1, 48_000).unwrap())));
        let (mut producer, consumer) = HeapRb::<f32>::new(4 * DRAIN_FRAMES).split();
        let mut drain = Drain::new(
            consumer,
            1,
            1,
            Arc::new(SharedLevelMeter::new(1)),
            Arc::clone(&writer),
            Arc::new(AtomicU64::new(0)),
        );

        let samples = vec![0.25; 3 * DRAIN_FRAMES];
        assert_eq!(producer.push_slice(&samples), samples.len());
        drain.drain().unwrap();
        assert_eq!(
            writer.lock().as_ref().unwrap().frames_written(),
            (3 * DRAIN_FRAMES) as u64
        );
    }

    #[test]
    fn feed_drops_whole_buffers_when_full() {
        let (producer, consumer) = HeapRb::<f32>::new(4).split();
        let overruns = Arc::new(AtomicU64::new(0));
        let mut feed = Feed {
            producer,
            overruns: Arc::clone(&overruns),
        };

        feed.push(&[1i16, 2, 3], i16_to_f32);
        feed.push(&[4i16, 5], i16_to_f32);
        assert_eq!(consumer.occupied_len(), 3);
        assert_eq!(overruns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_fault_is_kept() {
        let fault = Mutex::new(None);
        keep_first_fault(&fault, RecordError::Encoding("first".into()));
        keep_first_fault(&fault, RecordError::Encoding("second".into()));

        assert_eq!(fault.lock().take(), Some(RecordError::Encoding("first".into())));
    }

    #[test]
    fn integer_samples_convert_to_unit_range() {
        assert_eq!(i16_to_f32(0), 0.0);
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert!(i16_to_f32(i16::MAX) < 1.0);
        assert_eq!(u16_to_f32(32_768), 0.0);
        assert_eq!(u16_to_f32(0), -1.0);
    }
}
