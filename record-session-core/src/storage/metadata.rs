use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::error::RecordError;
use crate::models::recording_result::RecordingInfo;

/// Size, checksum and timestamp of a finished recording.
pub fn recording_info(path: &Path) -> Result<RecordingInfo, RecordError> {
    let attributes = path
        .metadata()
        .map_err(|e| RecordError::storage("failed to read file attributes", e))?;
    let created = attributes
        .created()
        .or_else(|_| attributes.modified())
        .map_err(|e| RecordError::storage("failed to read file timestamps", e))?;

    Ok(RecordingInfo {
        file_path: path.to_path_buf(),
        size_bytes: attributes.len(),
        checksum: sha256_file(path)?,
        created_at: DateTime::<Utc>::from(created),
    })
}

/// Serialize recording info for the collaborator that uploads the file.
pub fn to_json(info: &RecordingInfo) -> Result<String, RecordError> {
    serde_json::to_string_pretty(info)
        .map_err(|e| RecordError::storage("failed to serialize recording info", e))
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, RecordError> {
    let mut file = File::open(path)
        .map_err(|e| RecordError::storage("failed to read file for checksum", e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| RecordError::storage("failed to read file for checksum", e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
