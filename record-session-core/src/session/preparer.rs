//! Off-thread preparation of a capture resource.

use std::path::Path;
use std::thread::{self, JoinHandle};

use crate::models::config::CaptureSettings;
use crate::models::error::RecordError;
use crate::traits::capture_provider::{CaptureBackend, CaptureResource};

/// Delivers the outcome exactly once. If the preparation thread unwinds
/// before delivering, the receiver gets [`RecordError::Unknown`].
struct OutcomeGuard<R, F>
where
    F: FnOnce(Result<R, RecordError>),
{
    deliver: Option<F>,
    _resource: std::marker::PhantomData<fn(R)>,
}

impl<R, F> OutcomeGuard<R, F>
where
    F: FnOnce(Result<R, RecordError>),
{
    fn new(deliver: F) -> Self {
        Self {
            deliver: Some(deliver),
            _resource: std::marker::PhantomData,
        }
    }

    fn deliver(mut self, outcome: Result<R, RecordError>) {
        if let Some(deliver) = self.deliver.take() {
            deliver(outcome);
        }
    }
}

impl<R, F> Drop for OutcomeGuard<R, F>
where
    F: FnOnce(Result<R, RecordError>),
{
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            log::error!("capture preparation ended without an outcome");
            deliver(Err(RecordError::Unknown));
        }
    }
}

/// Open a resource for `path` and prepare it on a background thread.
///
/// Construction happens synchronously: if the backend rejects the settings
/// or path, the error is returned here and `on_outcome` is never called.
/// Otherwise `on_outcome` is called exactly once, from the preparation
/// thread, with the prepared resource (metering enabled) or the failure.
/// The preparer does not know about session state; the receiver decides
/// whether the outcome still applies.
pub fn prepare<B, F>(
    backend: &B,
    settings: &CaptureSettings,
    path: &Path,
    on_outcome: F,
) -> Result<JoinHandle<()>, RecordError>
where
    B: CaptureBackend,
    F: FnOnce(Result<B::Resource, RecordError>) + Send + 'static,
{
    let mut resource = backend.open(settings, path)?;

    thread::Builder::new()
        .name("capture-prepare".into())
        .spawn(move || {
            let guard = OutcomeGuard::new(on_outcome);
            let outcome = resource.prepare_to_record().map(|()| {
                resource.enable_metering();
                resource
            });
            guard.deliver(outcome);
        })
        .map_err(|e| RecordError::InitializationFailure(format!("failed to spawn preparer: {e}")))
}
