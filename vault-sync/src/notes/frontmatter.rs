//! Parse and re-serialize YAML frontmatter for vault notes.
//!
//! Hand-rolled, line-oriented YAML subset (no serde_yaml). Top-level `key: value`
//! lines become fields; indented lines, list items and comments are kept verbatim
//! so that anything we don't interpret survives the round trip into the site.

/// A single top-level frontmatter field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    /// Scalar value with surrounding quotes removed
    pub value: String,
    /// Quote character used in the source, if any
    pub quote: Option<char>,
    /// Raw lines following the key (block lists, nested maps, comments)
    pub continuation: Vec<String>,
}

impl Field {
    fn render(&self) -> String {
        match self.quote {
            Some('"') => format!("{}: \"{}\"", self.key, self.value.replace('"', "\\\"")),
            Some(q) => format!("{}: {q}{}{q}", self.key, self.value.replace(q, &format!("{q}{q}"))),
            None if self.value.is_empty() => format!("{}:", self.key),
            None => format!("{}: {}", self.key, self.value),
        }
    }
}

/// Ordered frontmatter metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Lines that appear before the first field
    preamble: Vec<String>,
    fields: Vec<Field>,
}

impl Metadata {
    /// Parse the YAML text between the `---` delimiters
    pub fn parse(yaml: &str) -> Self {
        let mut metadata = Metadata::default();

        for line in yaml.lines() {
            match parse_key_line(line) {
                Some((key, raw_value)) => {
                    let (value, quote) = unquote(raw_value);
                    metadata.fields.push(Field {
                        key: key.to_string(),
                        value,
                        quote,
                        continuation: Vec::new(),
                    });
                }
                None => match metadata.fields.last_mut() {
                    Some(field) => field.continuation.push(line.to_string()),
                    None => metadata.preamble.push(line.to_string()),
                },
            }
        }

        metadata
    }

    /// Serialize back to YAML text (without the `---` delimiters)
    pub fn serialize(&self) -> String {
        let mut lines = self.preamble.clone();
        for field in &self.fields {
            lines.push(field.render());
            lines.extend(field.continuation.iter().cloned());
        }
        lines.join("\n")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.field(key).map(|f| f.value.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        let idx = self.fields.iter().position(|f| f.key == key)?;
        Some(self.fields.remove(idx))
    }

    /// Rename a field in place. An existing field named `to` is replaced.
    /// Returns false when `from` is not present.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.field(from).is_none() {
            return false;
        }
        self.remove(to);
        if let Some(field) = self.fields.iter_mut().find(|f| f.key == from) {
            field.key = to.to_string();
        }
        true
    }
}

/// Split content into (frontmatter_yaml, body).
///
/// The content must open with a `---` line; the block ends at the next `---` line.
/// Trailing whitespace is allowed on both delimiter lines. The body is returned
/// untouched. Returns None when either delimiter is missing.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let opening = content.split_inclusive('\n').next()?;
    if !opening.ends_with('\n') || opening.trim_end() != "---" {
        return None;
    }
    let rest = &content[opening.len()..];

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = rest[..offset]
                .strip_suffix('\n')
                .map(|y| y.strip_suffix('\r').unwrap_or(y))
                .unwrap_or(&rest[..offset]);
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }

    None
}

/// Parse a complete note file into metadata and body
pub fn parse_document(content: &str) -> Option<(Metadata, &str)> {
    let (yaml, body) = split_frontmatter(content)?;
    Some((Metadata::parse(yaml), body))
}

/// Render metadata and body back into a complete note file
pub fn render_document(metadata: &Metadata, body: &str) -> String {
    let yaml = metadata.serialize();
    if yaml.is_empty() {
        format!("---\n---\n{}", body)
    } else {
        format!("---\n{}\n---\n{}", yaml, body)
    }
}

/// Recognize a top-level `key: value` line
fn parse_key_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with([' ', '\t', '-', '#']) {
        return None;
    }
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Remove surrounding quotes from a string, reporting the quote used
fn unquote(s: &str) -> (String, Option<char>) {
    let s = s.trim();
    if s.len() >= 2 {
        if s.starts_with('"') && s.ends_with('"') {
            return (s[1..s.len() - 1].replace("\\\"", "\""), Some('"'));
        }
        if s.starts_with('\'') && s.ends_with('\'') {
            return (s[1..s.len() - 1].replace("''", "'"), Some('\''));
        }
    }
    (s.to_string(), None)
}
