//! # record-session-core
//!
//! Platform-agnostic microphone record session.
//!
//! A [`RecordSession`] walks `idle → preparing → recording → recorded`
//! (or `failed` / `cancelled`), publishing every state to its subscribers.
//! Capture hardware plugs in through the [`CaptureBackend`] trait; the
//! synthetic [`ToneBackend`] ships here, a microphone backend lives in
//! `record-session-cpal`.
//!
//! ## Architecture
//!
//! ```text
//! record-session-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureResource, CaptureDelegate, LevelMeter, MeterObserver
//! ├── models/       ← RecordError, RecordState, RecordConfig, MeterSample, RecordingInfo
//! ├── processing/   ← level metering, channel remapping
//! ├── session/      ← RecordSession, Preparer, MeterPoller, Notifier
//! ├── storage/      ← session files, WAV writer, metadata
//! ├── capture/      ← ToneBackend
//! └── recognition   ← recognition request descriptor
//! ```

pub mod capture;
pub mod models;
pub mod processing;
pub mod recognition;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::tone::{ToneBackend, ToneOptions};
pub use models::config::{AudioCodec, AudioFormat, AudioQuality, CaptureSettings, RecordConfig, SessionOptions};
pub use models::error::RecordError;
pub use models::meter::MeterSample;
pub use models::recording_result::RecordingInfo;
pub use models::state::RecordState;
pub use recognition::{RecognitionRequest, ResultTypes};
pub use session::notifier::{Event, Subscription};
pub use session::record_session::{RecordSession, SessionEvent, SessionSubscription};
pub use storage::files::RecordingStore;
pub use storage::wav_writer::WavFileWriter;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::{CaptureBackend, CaptureResource, LevelMeter};
pub use traits::meter_observer::MeterObserver;
