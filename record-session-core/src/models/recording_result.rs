use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retained recording, as handed to whoever submits the file onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the file contents.
    pub checksum: String,
    /// When the file was created, or last written where the file system
    /// keeps no creation time. Serialized as RFC 3339.
    pub created_at: DateTime<Utc>,
}
