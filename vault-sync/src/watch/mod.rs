//! Vault change source: filesystem events for the notes and images directories
//!
//! The watcher turns raw `notify` events into `ChangeEvent`s on a channel; the
//! sync engine consumes them through the debounce coalescer.

pub mod coalescing;
pub mod watcher;

use crate::notes::file_ops;
use std::path::PathBuf;

pub use coalescing::{CoalescerConfig, EventCoalescer};
pub use watcher::VaultWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ChangeKind {
    Added,
    Changed,
}

/// Which vault directory an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Target {
    Note,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub target: Target,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, target: Target, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            target,
            path: path.into(),
        }
    }

    /// File name of the changed path (the note's file identity or the image name)
    pub fn file_name(&self) -> Option<String> {
        file_ops::file_name(&self.path)
    }
}
