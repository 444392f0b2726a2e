use std::path::Path;
use std::sync::Arc;

use crate::models::config::CaptureSettings;
use crate::models::error::RecordError;

use super::capture_delegate::CaptureDelegate;

/// Live per-channel power levels of a capture resource.
///
/// Shared between the resource and the meter poller, so reads must be cheap
/// and thread-safe.
pub trait LevelMeter: Send + Sync {
    /// Whether the resource is currently capturing.
    fn is_active(&self) -> bool;

    /// Refresh and return the average power of each channel, in dBFS.
    fn average_powers(&self) -> Vec<f32>;
}

/// Opens capture resources for a platform audio primitive.
///
/// Implemented by:
/// - `ToneBackend` (synthetic signal, this crate)
/// - `CpalBackend` (microphone via cpal, `record-session-cpal`)
pub trait CaptureBackend: Send + Sync + 'static {
    type Resource: CaptureResource;

    /// Construct a resource recording into `path`.
    ///
    /// Must be fast and must not create the file. Fails with
    /// [`RecordError::InitializationFailure`] when the settings or path are unusable.
    fn open(&self, settings: &CaptureSettings, path: &Path) -> Result<Self::Resource, RecordError>;
}

/// A single capture handle plus its destination file.
///
/// Owned exclusively by one session. Dropping a resource stops capture.
pub trait CaptureResource: Send + 'static {
    /// Destination file.
    fn path(&self) -> &Path;

    /// Acquire the device and create the file. May block.
    fn prepare_to_record(&mut self) -> Result<(), RecordError>;

    /// Turn on level metering. Called after a successful prepare.
    fn enable_metering(&mut self);

    /// Handle to the resource's level meter.
    fn meter(&self) -> Arc<dyn LevelMeter>;

    /// Begin capturing. Lifecycle events are reported to `delegate`.
    fn record(&mut self, delegate: Arc<dyn CaptureDelegate>) -> Result<(), RecordError>;

    fn is_recording(&self) -> bool;

    /// Stop capturing and finalize the file. Blocks until the file is
    /// complete; calling it again is a no-op.
    fn stop(&mut self) -> Result<(), RecordError>;
}
