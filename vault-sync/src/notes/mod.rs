//! Notes: loading, indexing and rewriting vault markdown for the site
//!
//! Vault notes are markdown files with YAML frontmatter and [[wikilinks]].
//! Only notes that carry a `slug` and a truthy `publish` flag are indexed;
//! their links are resolved against the index when written out.

pub mod file_ops;
pub mod frontmatter;
pub mod index;
pub mod loader;
pub mod note;
pub mod transform;

pub use index::NoteIndex;
pub use loader::NoteLoader;
pub use note::Note;
pub use transform::{transform, TransformOptions};
