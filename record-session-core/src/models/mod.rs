pub mod config;
pub mod error;
pub mod meter;
pub mod recording_result;
pub mod state;
