//! Link resolution and content transformation for published notes.
//!
//! `[[Title]]` and `[[Title|Display]]` markers are resolved against the note index
//! in a single forward pass: resolved targets become markdown links to the target's
//! slug, missing targets degrade to their display text.

use super::index::NoteIndex;
use super::note::{Note, SLUG_KEY};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[(.+?)\]\]").unwrap());

/// Nested markers unwrap one level per pass
const MAX_LINK_PASSES: usize = 16;

/// Options controlling how notes are rewritten for the site
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Prefix for generated links, ending in `/` (default: "/")
    pub link_base: String,
    /// Strip `file://<vault_path>` prefixes from media references
    pub replace_file_system_image_src: bool,
    /// Absolute vault root used for `file://` stripping
    pub vault_path: String,
    /// Frontmatter fields to rename, applied in order
    pub field_renames: Vec<(String, String)>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            link_base: "/".to_string(),
            replace_file_system_image_src: false,
            vault_path: String::new(),
            field_renames: Vec::new(),
        }
    }
}

/// A parsed `[[target|display]]` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkReference<'a> {
    pub target_title: &'a str,
    pub display_text: Option<&'a str>,
}

impl<'a> LinkReference<'a> {
    /// Parse the text between the brackets, splitting on the first `|`
    pub fn parse(inner: &'a str) -> Self {
        match inner.split_once('|') {
            Some((target_title, display_text)) => Self {
                target_title,
                display_text: Some(display_text),
            },
            None => Self {
                target_title: inner,
                display_text: None,
            },
        }
    }

    /// Text shown for the link
    pub fn text(&self) -> &'a str {
        self.display_text.unwrap_or(self.target_title)
    }
}

/// Rewrite every wikilink marker in `body`.
///
/// Unwrapping a marker can expose a new one (`[[[[B]]]]` leaves `[[B]]`), so the
/// scan repeats until no marker remains.
pub fn resolve_links(body: &str, index: &NoteIndex, link_base: &str) -> String {
    let mut out = resolve_pass(body, index, link_base);
    for _ in 1..MAX_LINK_PASSES {
        if !WIKILINK_RE.is_match(&out) {
            break;
        }
        out = resolve_pass(&out, index, link_base);
    }
    out
}

fn resolve_pass(body: &str, index: &NoteIndex, link_base: &str) -> String {
    WIKILINK_RE
        .replace_all(body, |cap: &Captures| {
            let link = LinkReference::parse(&cap[1]);
            match index.find_by_title(link.target_title) {
                Some(target) => format!("[{}]({}{}/)", link.text(), link_base, target.slug()),
                None => {
                    log::debug!("[SYNC] Unresolved link [[{}]], keeping text only", link.target_title);
                    link.text().to_string()
                }
            }
        })
        .into_owned()
}

/// Remove every `file://<vault_path>` prefix so media paths become site-relative
pub fn strip_file_urls(body: &str, vault_path: &str) -> String {
    body.replace(&format!("file://{}", vault_path), "")
}

/// Produce the site version of a note: links resolved, media paths normalized,
/// metadata fields renamed. The slug is never changed.
pub fn transform(note: &Note, index: &NoteIndex, options: &TransformOptions) -> Note {
    let mut out = note.clone();

    out.body = resolve_links(&note.body, index, &options.link_base);

    if options.replace_file_system_image_src && !options.vault_path.is_empty() {
        out.body = strip_file_urls(&out.body, &options.vault_path);
    }

    for (from, to) in &options.field_renames {
        if from == SLUG_KEY || to == SLUG_KEY {
            continue;
        }
        out.metadata.rename(from, to);
    }

    out
}
