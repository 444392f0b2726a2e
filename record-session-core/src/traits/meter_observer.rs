use crate::models::error::RecordError;
use crate::models::meter::MeterSample;

/// Owner side of the meter poller.
///
/// The poller delivers any number of samples followed by at most one of
/// `on_complete` / `on_error`.
pub trait MeterObserver: Send + Sync {
    fn on_sample(&self, sample: MeterSample);

    fn on_complete(&self);

    fn on_error(&self, error: RecordError);
}
