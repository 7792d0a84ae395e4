use super::file_ops;
use super::frontmatter::{self, Metadata};

/// Frontmatter key holding the output identity
pub const SLUG_KEY: &str = "slug";
/// Frontmatter key opting a note into publishing
pub const PUBLISH_KEY: &str = "publish";

/// A publishable vault note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Source file name, e.g. "My Note.md"
    pub file_id: String,
    /// File name without extension, only used for link matching
    pub title: String,
    pub metadata: Metadata,
    pub body: String,
}

impl Note {
    /// Build a Note from file content.
    ///
    /// Returns None for files without frontmatter, without a slug, or whose
    /// `publish` flag is not truthy.
    pub fn parse(file_id: &str, content: &str) -> Option<Note> {
        let (metadata, body) = frontmatter::parse_document(content)?;

        let slug = metadata.get(SLUG_KEY).map(str::trim).unwrap_or_default();
        if slug.is_empty() {
            return None;
        }
        if !metadata.get(PUBLISH_KEY).map(is_truthy).unwrap_or(false) {
            return None;
        }

        Some(Note {
            file_id: file_id.to_string(),
            title: file_ops::title_from_file_id(file_id).to_string(),
            metadata,
            body: body.to_string(),
        })
    }

    pub fn slug(&self) -> &str {
        self.metadata.get(SLUG_KEY).map(str::trim).unwrap_or_default()
    }

    /// Output file name for this note
    pub fn output_file_name(&self) -> String {
        file_ops::output_file_name(self.slug())
    }

    /// Full document text (frontmatter + body)
    pub fn render(&self) -> String {
        frontmatter::render_document(&self.metadata, &self.body)
    }
}

/// YAML-ish boolean check for the publish flag
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}
