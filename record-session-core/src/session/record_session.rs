use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::models::config::{RecordConfig, SessionOptions};
use crate::models::error::RecordError;
use crate::models::meter::MeterSample;
use crate::models::recording_result::RecordingInfo;
use crate::models::state::RecordState;
use crate::session::meter_poller::MeterPoller;
use crate::session::notifier::{Event, Notifier, Subscription};
use crate::session::preparer;
use crate::storage::files::{self, RecordingStore};
use crate::storage::metadata;
use crate::traits::capture_provider::{CaptureBackend, CaptureResource};
use crate::traits::meter_observer::MeterObserver;

pub type SessionEvent = Event<RecordState, RecordError>;
pub type SessionSubscription = Subscription<RecordState, RecordError>;

/// What happens to the session file on a terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleanup {
    Retain,
    DeleteFile,
}

/// Mutable session state, protected by `parking_lot::Mutex`.
struct Inner<R> {
    state: RecordState,
    poller: Option<MeterPoller>,
    resource: Option<R>,
}

struct Shared<B: CaptureBackend> {
    backend: B,
    config: RecordConfig,
    options: SessionOptions,
    url: PathBuf,
    inner: Mutex<Inner<B::Resource>>,
    notifier: Arc<Notifier<RecordState, RecordError>>,
}

/// One microphone recording, from `idle` to a single terminal state.
///
/// ```text
/// start() → [Preparer thread] → on_prepared → recording ─┬→ finish() → recorded
///                                                │       ├→ cancel() → cancelled (file deleted)
///                                   [MeterPoller thread] └→ capture fault → failed
///                                    on_sample / on_complete / on_error
/// ```
///
/// Commands never fail and never block on preparation; every failure
/// surfaces as the terminal `failed` state. Handles are cheap to clone and
/// share one session. Dropping the last handle releases a running capture
/// without emitting any notification.
pub struct RecordSession<B: CaptureBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: CaptureBackend> Clone for RecordSession<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: CaptureBackend> RecordSession<B> {
    /// Create an idle session. Its file URL is assigned here and never changes.
    pub fn new(backend: B, config: RecordConfig, options: SessionOptions) -> Self {
        let url = RecordingStore::new(options.storage_dir.clone())
            .new_session_path(config.file_extension());
        log::debug!("new record session at {}", url.display());

        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                options,
                url,
                inner: Mutex::new(Inner {
                    state: RecordState::Idle,
                    poller: None,
                    resource: None,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    pub fn url(&self) -> &Path {
        &self.shared.url
    }

    pub fn config(&self) -> &RecordConfig {
        &self.shared.config
    }

    pub fn state(&self) -> RecordState {
        self.shared.inner.lock().state.clone()
    }

    /// Observe state changes from now on.
    pub fn subscribe(&self) -> SessionSubscription {
        self.shared.notifier.subscribe()
    }

    /// Size, checksum and timestamp of the file, once `recorded`.
    pub fn recording_info(&self) -> Option<RecordingInfo> {
        if self.state() != RecordState::Recorded {
            return None;
        }
        match metadata::recording_info(&self.shared.url) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("recording info unavailable: {}", e);
                None
            }
        }
    }

    /// Begin preparing capture. No-op unless `idle`.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !inner.state.is_idle() {
            log::debug!("start ignored in state {}", inner.state);
            return;
        }
        shared.set_state(&mut inner, RecordState::Preparing);

        if let Err(reason) = shared.config.validate() {
            let error = RecordError::InitializationFailure(reason);
            shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
            return;
        }
        if let Err(error) = RecordingStore::new(shared.options.storage_dir.clone()).ensure_dir() {
            shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
            return;
        }

        let weak = Arc::downgrade(shared);
        let settings = shared.config.capture_settings();
        let spawned = preparer::prepare(&shared.backend, &settings, &shared.url, move |outcome| {
            match weak.upgrade() {
                Some(shared) => Shared::on_prepare_outcome(&shared, outcome),
                None => {
                    if let Ok(resource) = outcome {
                        discard_resource(resource);
                    }
                }
            }
        });

        if let Err(error) = spawned {
            shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
        }
    }

    /// Abandon the recording. While recording, capture is stopped and the
    /// file deleted before this returns. No-op in any other state.
    pub fn cancel(&self) {
        let inner = self.shared.inner.lock();
        let cleanup = match &inner.state {
            RecordState::Preparing => Cleanup::Retain,
            RecordState::Recording { .. } => Cleanup::DeleteFile,
            state => {
                log::debug!("cancel ignored in state {}", state);
                return;
            }
        };
        self.shared.terminate(inner, RecordState::Cancelled, cleanup);
    }

    /// Complete the recording, keeping the file. Finishing before capture
    /// has begun cancels the session instead.
    pub fn finish(&self) {
        let inner = self.shared.inner.lock();
        let terminal = match &inner.state {
            RecordState::Preparing => RecordState::Cancelled,
            RecordState::Recording { .. } => RecordState::Recorded,
            state => {
                log::debug!("finish ignored in state {}", state);
                return;
            }
        };
        self.shared.terminate(inner, terminal, Cleanup::Retain);
    }
}

impl<B: CaptureBackend> Shared<B> {
    /// Non-terminal transition, published while the lock is held so that
    /// notifications keep transition order.
    fn set_state(&self, inner: &mut Inner<B::Resource>, state: RecordState) -> bool {
        debug_assert!(!state.is_final());
        if !inner.state.can_transition_to(&state) {
            log::warn!("illegal transition {} -> {}", inner.state, state);
            return false;
        }

        if inner.state.is_recording() && state.is_recording() {
            log::trace!("Record state: {}", state);
        } else {
            log::info!("Record state: {}", state);
        }
        inner.state = state.clone();
        self.notifier.next(state);
        true
    }

    /// Terminal transition.
    ///
    /// The state is committed and the poller and resource are moved out under
    /// the lock; they are stopped after it is released, then the file is
    /// cleaned up and the terminal notification published last.
    fn terminate(
        &self,
        mut inner: MutexGuard<'_, Inner<B::Resource>>,
        terminal: RecordState,
        cleanup: Cleanup,
    ) {
        debug_assert!(terminal.is_final());
        if !inner.state.can_transition_to(&terminal) {
            log::warn!("illegal transition {} -> {}", inner.state, terminal);
            return;
        }
        log::info!("Record state: {}", terminal);
        inner.state = terminal.clone();
        let poller = inner.poller.take();
        let resource = inner.resource.take();
        drop(inner);

        if let Some(mut poller) = poller {
            poller.stop();
        }
        if let Some(mut resource) = resource {
            if let Err(e) = resource.stop() {
                log::error!("failed to stop capture: {}", e);
            }
        }
        if cleanup == Cleanup::DeleteFile {
            match files::delete_if_exists(&self.url) {
                Ok(true) => log::debug!("deleted {}", self.url.display()),
                Ok(false) => {}
                Err(e) => log::warn!("{}", e),
            }
        }

        match terminal {
            RecordState::Failed(error) => {
                self.notifier.error(error);
            }
            state => {
                self.notifier.next(state);
                self.notifier.complete();
            }
        }
    }

    fn on_prepare_outcome(shared: &Arc<Self>, outcome: Result<B::Resource, RecordError>) {
        let inner = shared.inner.lock();
        if !inner.state.is_preparing() {
            drop(inner);
            log::debug!("discarding late preparation result");
            if let Ok(resource) = outcome {
                discard_resource(resource);
            }
            return;
        }

        match outcome {
            Ok(resource) => Self::begin_recording(shared, inner, resource),
            Err(error) => shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain),
        }
    }

    fn begin_recording(
        shared: &Arc<Self>,
        mut inner: MutexGuard<'_, Inner<B::Resource>>,
        resource: B::Resource,
    ) {
        let mut poller = MeterPoller::new(
            resource.meter(),
            shared.config.channels as usize,
            shared.options.meter_interval,
        );
        let meters = poller.current_sample();
        shared.set_state(&mut inner, RecordState::Recording { meters });
        inner.resource = Some(resource);

        let link = Arc::new(SessionLink {
            shared: Arc::downgrade(shared),
        });
        if let Err(error) = poller.start(link) {
            shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
            return;
        }
        let delegate = poller.delegate();
        inner.poller = Some(poller);

        let began = match inner.resource.as_mut() {
            Some(resource) => resource.record(delegate),
            None => Err(RecordError::Unknown),
        };
        if let Err(error) = began {
            shared.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
        }
    }

    fn on_sample(&self, meters: MeterSample) {
        let mut inner = self.inner.lock();
        if inner.state.is_recording() {
            self.set_state(&mut inner, RecordState::Recording { meters });
        }
    }

    fn on_capture_complete(&self) {
        let inner = self.inner.lock();
        if inner.state.is_recording() {
            self.terminate(inner, RecordState::Recorded, Cleanup::Retain);
        }
    }

    fn on_capture_error(&self, error: RecordError) {
        let inner = self.inner.lock();
        if inner.state.is_recording() {
            self.terminate(inner, RecordState::Failed(error), Cleanup::Retain);
        }
    }
}

/// Release a resource nobody is waiting for and remove the file it created.
fn discard_resource<R: CaptureResource>(resource: R) {
    let path = resource.path().to_path_buf();
    drop(resource);
    if let Err(e) = files::delete_if_exists(&path) {
        log::warn!("{}", e);
    }
}

/// Meter poller → session. Holds the session weakly so a poller never keeps
/// a dropped session alive.
struct SessionLink<B: CaptureBackend> {
    shared: Weak<Shared<B>>,
}

impl<B: CaptureBackend> MeterObserver for SessionLink<B> {
    fn on_sample(&self, sample: MeterSample) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_sample(sample);
        }
    }

    fn on_complete(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_capture_complete();
        }
    }

    fn on_error(&self, error: RecordError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_capture_error(error);
        }
    }
}
