use crate::models::error::RecordError;

/// Callbacks a capture resource reports its lifecycle through.
///
/// Called from backend threads (a capture thread or the audio driver's
/// callback thread). Implementations must not block; the session's
/// delegate only records the outcome and lets the meter poller forward it.
/// A backend may report more than once; receivers keep the first report.
pub trait CaptureDelegate: Send + Sync {
    /// Capture stopped and the file is finalized. `successfully` is `false`
    /// when the recording was interrupted.
    fn on_capture_finished(&self, successfully: bool);

    /// The encoder failed. `None` when the backend has no specific error.
    fn on_encode_error(&self, error: Option<RecordError>);
}
