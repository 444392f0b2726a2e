use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::RecordError;
use crate::models::meter::MeterSample;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::LevelMeter;
use crate::traits::meter_observer::MeterObserver;

/// State shared between the poller handle, its thread and the capture
/// backend (as the backend's [`CaptureDelegate`]).
struct PollerShared {
    running: AtomicBool,
    finished: AtomicBool,
    outcome: Mutex<Option<Result<(), RecordError>>>,
}

impl PollerShared {
    /// Record the terminal outcome. Only the first report counts.
    fn finalize(&self, outcome: Result<(), RecordError>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            log::debug!("ignoring capture report after finalize: {:?}", outcome);
            return;
        }
        *self.outcome.lock() = Some(outcome);
    }
}

impl CaptureDelegate for PollerShared {
    fn on_capture_finished(&self, successfully: bool) {
        if successfully {
            self.finalize(Ok(()));
        } else {
            log::warn!("recording interrupted");
            self.finalize(Err(RecordError::UndefinedCaptureError));
        }
    }

    fn on_encode_error(&self, error: Option<RecordError>) {
        let error = error.unwrap_or(RecordError::UndefinedCaptureError);
        log::error!("capture encode error: {}", error);
        self.finalize(Err(error));
    }
}

/// Samples channel power at a fixed interval while capture is active.
///
/// The poller is also the capture resource's delegate: terminal reports from
/// the backend are stored and forwarded to the owner from the poller thread
/// on its next tick, after which ticking stops.
pub struct MeterPoller {
    meter: Arc<dyn LevelMeter>,
    channels: usize,
    interval: Duration,
    shared: Arc<PollerShared>,
    handle: Option<JoinHandle<()>>,
}

impl MeterPoller {
    pub fn new(meter: Arc<dyn LevelMeter>, channels: usize, interval: Duration) -> Self {
        Self {
            meter,
            channels,
            interval,
            shared: Arc::new(PollerShared {
                running: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                outcome: Mutex::new(None),
            }),
            handle: None,
        }
    }

    /// Delegate to hand to the capture resource.
    pub fn delegate(&self) -> Arc<dyn CaptureDelegate> {
        Arc::clone(&self.shared) as Arc<dyn CaptureDelegate>
    }

    /// Read the meters right now ("tick 0").
    pub fn current_sample(&self) -> MeterSample {
        read_sample(self.meter.as_ref(), self.channels)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start ticking, delivering to `observer`.
    pub fn start(&mut self, observer: Arc<dyn MeterObserver>) -> Result<(), RecordError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let meter = Arc::clone(&self.meter);
        let channels = self.channels;
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("meter-poller".into())
            .spawn(move || {
                while shared.running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if !shared.running.load(Ordering::SeqCst) {
                        break;
                    }

                    let outcome = shared.outcome.lock().take();
                    if let Some(outcome) = outcome {
                        shared.running.store(false, Ordering::SeqCst);
                        match outcome {
                            Ok(()) => observer.on_complete(),
                            Err(error) => observer.on_error(error),
                        }
                        break;
                    }

                    if !meter.is_active() {
                        continue;
                    }
                    observer.on_sample(read_sample(meter.as_ref(), channels));
                }
            })
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                RecordError::InitializationFailure(format!("failed to spawn meter poller: {e}"))
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop ticking and ignore any later capture reports.
    ///
    /// Joins the poller thread unless called from it.
    pub fn stop(&mut self) {
        self.shared.finished.store(true, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MeterPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_sample(meter: &dyn LevelMeter, channels: usize) -> MeterSample {
    MeterSample::from_powers(meter.average_powers(), channels)
}
