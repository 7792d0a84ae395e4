//! Note loader: reads one vault file and decides whether it is publishable.

use super::note::Note;
use crate::error::{Result, SyncError};
use std::path::{Path, PathBuf};

/// Loads notes from the vault notes directory by file identity
#[derive(Debug, Clone)]
pub struct NoteLoader {
    notes_dir: PathBuf,
}

impl NoteLoader {
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
        }
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    pub fn path_for(&self, file_id: &str) -> PathBuf {
        self.notes_dir.join(file_id)
    }

    /// Load a note by file name.
    ///
    /// `Ok(None)` means the file exists but is not publishable. Read failures
    /// (vanished file, permissions, invalid UTF-8) are returned as errors.
    pub async fn load(&self, file_id: &str) -> Result<Option<Note>> {
        let path = self.path_for(file_id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::io(&path, e))?;

        let note = Note::parse(file_id, &content);
        if note.is_none() {
            log::debug!("[INDEX] Skipping {}: not publishable", file_id);
        }
        Ok(note)
    }
}
