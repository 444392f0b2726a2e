//! Level metering over interleaved f32 audio.
//!
//! Capture backends feed every captured buffer into a [`SharedLevelMeter`];
//! the meter poller reads per-channel average power from it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::models::meter::{MAX_POWER_DB, MIN_POWER_DB};
use crate::traits::capture_provider::LevelMeter;

/// Root-mean-square level of samples (0.0 to 1.0 for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert a linear RMS level to dBFS, clamped to the meter range.
pub fn power_db(rms: f32) -> f32 {
    if rms <= 0.0 || rms.is_nan() {
        return MIN_POWER_DB;
    }
    (20.0 * rms.log10()).clamp(MIN_POWER_DB, MAX_POWER_DB)
}

/// Per-channel power accumulator.
///
/// Sums squared samples between reads. A read with no new audio repeats the
/// previous value.
#[derive(Debug, Clone)]
pub struct ChannelMeter {
    sums: Vec<f64>,
    frames: u64,
    last: Vec<f32>,
}

impl ChannelMeter {
    pub fn new(channels: usize) -> Self {
        Self {
            sums: vec![0.0; channels],
            frames: 0,
            last: vec![MIN_POWER_DB; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.sums.len()
    }

    /// Add interleaved samples. A trailing partial frame is ignored.
    pub fn accumulate(&mut self, interleaved: &[f32]) {
        let channels = self.channels();
        if channels == 0 {
            return;
        }
        for frame in interleaved.chunks_exact(channels) {
            for (sum, sample) in self.sums.iter_mut().zip(frame) {
                *sum += f64::from(*sample) * f64::from(*sample);
            }
            self.frames += 1;
        }
    }

    /// Average power per channel since the previous call, in dBFS.
    pub fn take_average_powers(&mut self) -> Vec<f32> {
        if self.frames > 0 {
            let frames = self.frames as f64;
            for (last, sum) in self.last.iter_mut().zip(self.sums.iter_mut()) {
                *last = power_db((*sum / frames).sqrt() as f32);
                *sum = 0.0;
            }
            self.frames = 0;
        }
        self.last.clone()
    }
}

/// Thread-safe [`LevelMeter`] fed by a capture callback.
pub struct SharedLevelMeter {
    active: AtomicBool,
    metering: AtomicBool,
    meter: Mutex<ChannelMeter>,
}

impl SharedLevelMeter {
    pub fn new(channels: usize) -> Self {
        Self {
            active: AtomicBool::new(false),
            metering: AtomicBool::new(false),
            meter: Mutex::new(ChannelMeter::new(channels)),
        }
    }

    pub fn enable_metering(&self) {
        self.metering.store(true, Ordering::SeqCst);
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Feed captured audio. Ignored until metering is enabled.
    pub fn accumulate(&self, interleaved: &[f32]) {
        if self.metering.load(Ordering::Relaxed) {
            self.meter.lock().accumulate(interleaved);
        }
    }
}

impl LevelMeter for SharedLevelMeter {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn average_powers(&self) -> Vec<f32> {
        let mut meter = self.meter.lock();
        if !self.metering.load(Ordering::SeqCst) {
            return vec![MIN_POWER_DB; meter.channels()];
        }
        meter.take_average_powers()
    }
}
