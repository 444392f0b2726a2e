//! # record-session-cpal
//!
//! Microphone backend for record-session, built on cpal.
//!
//! Provides:
//! - `CpalBackend` / `CpalResource`: microphone capture into a 16-bit PCM WAV file
//! - `device`: input device lookup and stream configuration
//!
//! ## Usage
//! ```ignore
//! use record_session_core::{RecordConfig, RecordSession, SessionOptions};
//! use record_session_cpal::CpalBackend;
//!
//! let session = RecordSession::new(
//!     CpalBackend::default_device(),
//!     RecordConfig::default(),
//!     SessionOptions::default(),
//! );
//! session.start();
//! ```

pub mod cpal_backend;
pub mod device;

pub use cpal_backend::{CpalBackend, CpalResource};
pub use device::{list_input_devices, DeviceError};
