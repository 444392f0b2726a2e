//! Session file lifecycle: naming, startup purge, cancellation cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;

const RECORDINGS_DIR_NAME: &str = "Recordings";

/// Default session-storage directory: `<documents>/Recordings`.
///
/// A dedicated subdirectory, because [`RecordingStore::purge_stale_files`]
/// empties it entirely.
pub fn default_storage_dir() -> PathBuf {
    dirs_next::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(RECORDINGS_DIR_NAME)
}

/// Directory holding session recordings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingStore {
    dir: PathBuf,
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_location() -> Self {
        Self::new(default_storage_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), RecordError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| RecordError::storage("failed to create recordings directory", e))
    }

    /// Remove every entry of the directory, returning how many went away.
    ///
    /// Destructive: recordings from previous runs are lost. Individual
    /// failures are logged and skipped. The directory is created if missing.
    pub fn purge_stale_files(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Err(e) = self.ensure_dir() {
                    log::warn!("{}", e);
                }
                return 0;
            }
            Err(e) => {
                log::warn!("failed to list {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("failed to remove {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            log::info!("{} files removed", removed);
        }
        removed
    }

    /// A fresh, collision-free path `<dir>/<uuid>.<extension>`.
    pub fn new_session_path(&self, extension: &str) -> PathBuf {
        self.dir
            .join(uuid::Uuid::new_v4().to_string().to_uppercase())
            .with_extension(extension)
    }
}

/// Delete `path` if it exists. Returns whether a file was removed.
pub fn delete_if_exists(path: &Path) -> Result<bool, RecordError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RecordError::storage("failed to delete recording", e)),
    }
}
