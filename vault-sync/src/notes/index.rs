//! NoteIndex: in-memory index of publishable notes
//!
//! Keyed by file identity and ordered lexically, so every "first match" lookup
//! (duplicate titles, duplicate slugs) resolves the same way on every run.

use super::file_ops;
use super::loader::NoteLoader;
use super::note::Note;
use crate::error::{Result, SyncError};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct NoteIndex {
    notes: BTreeMap<String, Note>,
}

impl NoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every publishable note in the loader's directory into a fresh index.
    ///
    /// Files are read concurrently. A file that fails to read is logged and left
    /// out; failing to list the directory is returned as an error.
    pub async fn load_all(loader: &NoteLoader) -> Result<Self> {
        let dir = loader.notes_dir();
        let files = file_ops::list_notes(dir)
            .await
            .map_err(|e| SyncError::io(dir, e))?;

        let results = join_all(files.iter().map(|file_id| loader.load(file_id))).await;

        let mut index = NoteIndex::new();
        for (file_id, result) in files.iter().zip(results) {
            match result {
                Ok(Some(note)) => {
                    index.upsert(note);
                }
                Ok(None) => {}
                Err(e) => log::warn!("[INDEX] Failed to load {}: {}", file_id, e),
            }
        }

        log::info!(
            "[INDEX] Indexed {} publishable notes out of {} files",
            index.len(),
            files.len()
        );
        Ok(index)
    }

    /// Insert or replace a note, returning the previous entry
    pub fn upsert(&mut self, note: Note) -> Option<Note> {
        self.notes.insert(note.file_id.clone(), note)
    }

    pub fn get(&self, file_id: &str) -> Option<&Note> {
        self.notes.get(file_id)
    }

    /// Find a note by title. With colliding titles the lexically smallest file
    /// identity wins.
    pub fn find_by_title(&self, title: &str) -> Option<&Note> {
        self.notes.values().find(|note| note.title == title)
    }

    /// All notes in file identity order
    pub fn all(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The set of slugs that currently map to an output file
    pub fn slugs(&self) -> HashSet<String> {
        self.notes.values().map(|n| n.slug().to_string()).collect()
    }

    /// The note that owns `slug`'s output file: the lexically smallest file identity
    /// among notes sharing it
    pub fn slug_owner(&self, slug: &str) -> Option<&Note> {
        self.notes.values().find(|note| note.slug() == slug)
    }

    pub fn owns_slug(&self, note: &Note) -> bool {
        self.slug_owner(note.slug())
            .map(|owner| owner.file_id == note.file_id)
            .unwrap_or(false)
    }

    /// Slugs claimed by more than one note, with the claiming file identities
    pub fn duplicate_slugs(&self) -> Vec<(String, Vec<String>)> {
        let mut by_slug: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for note in self.notes.values() {
            by_slug
                .entry(note.slug())
                .or_default()
                .push(note.file_id.clone());
        }

        by_slug
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(slug, files)| (slug.to_string(), files))
            .collect()
    }
}
