use thiserror::Error;

/// Errors that can end a record session.
///
/// A cancelled session is not an error; it is reported through
/// [`RecordState::Cancelled`](super::state::RecordState::Cancelled).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The capture resource could not be constructed from the settings or path.
    #[error("failed to initiate recording: {0}")]
    InitializationFailure(String),

    /// The capture layer failed without naming a cause.
    #[error("undefined recording error")]
    UndefinedCaptureError,

    /// The capture layer reported a specific encoding fault.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Writing or finalizing the recording file failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A failure was reported without any error value.
    #[error("unknown error")]
    Unknown,
}

impl RecordError {
    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }
}

impl From<hound::Error> for RecordError {
    fn from(err: hound::Error) -> Self {
        Self::storage("wav", err)
    }
}
