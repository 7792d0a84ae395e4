//! "Is this image referenced?" checks used when copying vault images.

use crate::notes::Note;
use serde::Deserialize;

/// How strictly an image file name must appear in a note body
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageMatch {
    /// File name appears anywhere in the body. Can false-positive on names that
    /// are substrings of other text ("cat.png" inside "bobcat.png").
    #[default]
    Substring,
    /// File name appears delimited by characters that can't be part of a file name
    Token,
}

impl ImageMatch {
    pub fn matches(self, text: &str, image_name: &str) -> bool {
        if image_name.is_empty() {
            return false;
        }
        match self {
            ImageMatch::Substring => text.contains(image_name),
            ImageMatch::Token => contains_token(text, image_name),
        }
    }
}

/// True if any note body references the image
pub fn is_referenced<'a>(
    image_name: &str,
    mut notes: impl Iterator<Item = &'a Note>,
    mode: ImageMatch,
) -> bool {
    notes.any(|note| mode.matches(&note.body, image_name))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn contains_token(text: &str, name: &str) -> bool {
    text.match_indices(name).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + name.len()..].chars().next();
        !before.is_some_and(is_name_char) && !after.is_some_and(is_name_char)
    })
}
