//! Sync: writes published notes and their images into the site directories

pub mod engine;
pub mod images;

pub use engine::SyncEngine;
