//! File operations for vault and site directories
//!
//! Flat directory listings (no recursion), dotfile filtering, and writes that
//! create the destination directory on demand.

use std::io;
use std::path::Path;

/// Markdown extension used for both vault notes and site output
pub const NOTE_EXTENSION: &str = "md";

/// Dotfiles (editor swap files, `.obsidian`, `.DS_Store`) are never synced
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub fn is_markdown(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| e == NOTE_EXTENSION)
        .unwrap_or(false)
}

/// Final path component as an owned string
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

/// Note title for a file identity ("My Note.md" -> "My Note")
pub fn title_from_file_id(file_id: &str) -> &str {
    file_id.strip_suffix(".md").unwrap_or(file_id)
}

/// Output file name for a slug ("my-note" -> "my-note.md")
pub fn output_file_name(slug: &str) -> String {
    format!("{}.{}", slug, NOTE_EXTENSION)
}

/// List the names of all visible regular files directly inside `dir`, sorted
pub async fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

/// List the names of all visible markdown files directly inside `dir`, sorted
pub async fn list_notes(dir: &Path) -> io::Result<Vec<String>> {
    Ok(list_files(dir)
        .await?
        .into_iter()
        .filter(|name| is_markdown(name))
        .collect())
}

/// Write a note file (creates parent directories as needed)
pub async fn write_note(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Copy a file (creates parent directories as needed)
pub async fn copy_file(from: &Path, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_title_from_file_id() {
        assert_eq!(title_from_file_id("My Note.md"), "My Note");
        assert_eq!(title_from_file_id("v1.2 notes.md"), "v1.2 notes");
        assert_eq!(title_from_file_id("README"), "README");
    }

    #[test]
    fn test_is_markdown() {
        assert!(is_markdown("a.md"));
        assert!(!is_markdown("a.md.bak"));
        assert!(!is_markdown("image.png"));
    }

    #[tokio::test]
    async fn test_list_notes() {
        let dir = tempdir().unwrap();
        let notes_dir = dir.path();

        fs::write(notes_dir.join("b.md"), "content").unwrap();
        fs::write(notes_dir.join("a.md"), "content").unwrap();
        fs::write(notes_dir.join("image.png"), "png").unwrap();
        // Hidden files and subdirectories are skipped
        fs::write(notes_dir.join(".draft.md"), "content").unwrap();
        fs::create_dir(notes_dir.join("sub.md")).unwrap();

        let files = list_notes(notes_dir).await.unwrap();
        assert_eq!(files, vec!["a.md", "b.md"]);

        let all = list_files(notes_dir).await.unwrap();
        assert_eq!(all, vec!["a.md", "b.md", "image.png"]);
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(list_notes(&dir.path().join("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_write_and_copy_create_parents() {
        let dir = tempdir().unwrap();
        let note = dir.path().join("out/notes/a.md");

        write_note(&note, "# A").await.unwrap();
        assert_eq!(fs::read_to_string(&note).unwrap(), "# A");

        let copy = dir.path().join("out/images/a.md");
        copy_file(&note, &copy).await.unwrap();
        assert!(copy.exists());
    }
}
