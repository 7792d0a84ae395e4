//! Filesystem watcher for the vault notes and images directories.

use super::{ChangeEvent, ChangeKind, Target};
use crate::error::Result;
use crate::notes::file_ops;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Keeps the underlying watcher alive; dropping it stops event delivery
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Start watching both directories (non-recursively), sending classified
    /// events to `tx`.
    pub fn start(
        notes_dir: &Path,
        images_dir: &Path,
        tx: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Result<Self> {
        let notes_dir = canonical(notes_dir);
        let images_dir = canonical(images_dir);

        let dirs = WatchedDirs {
            notes: notes_dir.clone(),
            images: images_dir.clone(),
        };
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in dirs.classify(&event) {
                    log::debug!("[WATCH] {} {} {}", change.kind, change.target, change.path.display());
                    if tx.send(change).is_err() {
                        log::debug!("[WATCH] Event receiver dropped, ignoring event");
                    }
                }
            }
            Err(e) => log::error!("[WATCH] File watcher error: {}", e),
        })?;

        watcher.watch(&notes_dir, RecursiveMode::NonRecursive)?;
        if images_dir != notes_dir {
            watcher.watch(&images_dir, RecursiveMode::NonRecursive)?;
        }

        log::info!(
            "[WATCH] Watching {} and {} for changes...",
            notes_dir.display(),
            images_dir.display()
        );

        Ok(Self { _watcher: watcher })
    }
}

/// The two directories events are classified against
#[derive(Debug, Clone)]
pub struct WatchedDirs {
    pub notes: PathBuf,
    pub images: PathBuf,
}

impl WatchedDirs {
    /// Map a raw notify event to vault change events.
    ///
    /// Creates become `Added`, content modifications and renames into the
    /// directory become `Changed`/`Added`. Removals and metadata-only changes are
    /// ignored, as are dotfiles and anything outside the two directories.
    pub fn classify(&self, event: &Event) -> Vec<ChangeEvent> {
        let Some(kind) = change_kind(&event.kind) else {
            return Vec::new();
        };

        let is_rename = matches!(event.kind, EventKind::Modify(ModifyKind::Name(_)));
        let paths: &[PathBuf] = match event.kind {
            // [from, to]: only the destination still exists
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.last().map(std::slice::from_ref).unwrap_or_default()
            }
            _ => &event.paths,
        };

        paths
            .iter()
            .filter(|path| !is_rename || path.is_file())
            .filter_map(|path| self.target_of(path).map(|target| ChangeEvent::new(kind, target, path.clone())))
            .collect()
    }

    fn target_of(&self, path: &Path) -> Option<Target> {
        let name = file_ops::file_name(path)?;
        if file_ops::is_hidden(&name) {
            return None;
        }

        let parent = path.parent()?;
        if parent == self.notes && file_ops::is_markdown(&name) {
            Some(Target::Note)
        } else if parent == self.images {
            Some(Target::Image)
        } else {
            None
        }
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Added),
        EventKind::Modify(_) => Some(ChangeKind::Changed),
        _ => None,
    }
}

/// Event paths are reported in canonical form on some platforms
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
