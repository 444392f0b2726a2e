use std::fmt;

use super::error::RecordError;
use super::meter::MeterSample;

/// Record session state machine.
///
/// State transitions:
/// ```text
/// idle → preparing → recording → recorded / failed
///            ↓           ↓
///     failed / cancelled cancelled
/// ```
///
/// `Recorded`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    Idle,
    Preparing,
    Recording { meters: MeterSample },
    Recorded,
    Failed(RecordError),
    Cancelled,
}

impl RecordState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_preparing(&self) -> bool {
        matches!(self, Self::Preparing)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    /// Whether no further transitions can follow.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Recorded | Self::Failed(_) | Self::Cancelled)
    }

    /// The meter payload while recording.
    pub fn meters(&self) -> Option<&MeterSample> {
        match self {
            Self::Recording { meters } => Some(meters),
            _ => None,
        }
    }

    /// Whether the transition graph allows moving from `self` to `next`.
    ///
    /// `Recording → Recording` is allowed and carries a fresh meter sample.
    pub fn can_transition_to(&self, next: &RecordState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Preparing) => true,
            (Self::Preparing, Self::Recording { .. } | Self::Failed(_) | Self::Cancelled) => true,
            (
                Self::Recording { .. },
                Self::Recording { .. } | Self::Recorded | Self::Failed(_) | Self::Cancelled,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Preparing => f.write_str("Preparing"),
            Self::Recording { .. } => f.write_str("Recording"),
            Self::Recorded => f.write_str("Recorded"),
            Self::Failed(error) => write!(f, "Failed. {error}"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}
