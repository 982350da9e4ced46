//! Front matter block
//!
//! A document may open with a `---` line, a run of `key: value` lines and a
//! closing `---` line. Keys keep their original order. List values are
//! written `[a, b]`; bare comma-separated values are accepted on read.
//!
//! Anything that does not look like a complete block is left in the body.

use std::collections::BTreeSet;

use memvault_core::ContextPriority;

const DELIMITER: &str = "---";

/// Key holding the part list of a split document
pub const PARTS_KEY: &str = "parts";

/// Ordered `key: value` pairs from a document header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    entries: Vec<(String, String)>,
}

impl FrontMatter {
    /// Empty front matter
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the lines between the delimiters
    ///
    /// Lines without a `:` separator or with an empty key are skipped.
    pub fn parse(block: &str) -> Self {
        let mut fm = FrontMatter::new();
        for line in block.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    fm.set(key, value.trim());
                }
            }
        }
        fm
    }

    /// Whether there are no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Raw value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, keeping its slot if it already exists
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Set `key` to a bracketed list
    pub fn set_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) {
        let items: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
        self.set(key, format!("[{}]", items.join(", ")));
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// List value of `key`; empty when absent
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(parse_list).unwrap_or_default()
    }

    /// `tags` as a set
    pub fn tags(&self) -> BTreeSet<String> {
        self.list("tags").into_iter().collect()
    }

    /// `aliases` as a set
    pub fn aliases(&self) -> BTreeSet<String> {
        self.list("aliases").into_iter().collect()
    }

    /// `context_priority`, if present and recognized
    pub fn context_priority(&self) -> Option<ContextPriority> {
        self.get("context_priority")?.parse().ok()
    }

    /// `pinned: true`
    pub fn pinned(&self) -> bool {
        matches!(self.get("pinned"), Some(v) if v.eq_ignore_ascii_case("true"))
    }

    /// Part filenames of a split document
    pub fn parts(&self) -> Vec<String> {
        self.list(PARTS_KEY)
    }

    /// Overlay `other`: its keys win, new keys are appended
    pub fn merge(&mut self, other: &FrontMatter) {
        for (key, value) in &other.entries {
            self.set(key, value.clone());
        }
    }

    /// Render as a delimited block with a trailing newline
    pub fn render(&self) -> String {
        let mut out = String::from(DELIMITER);
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push(':');
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    let inner = raw.trim();
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(inner);
    inner
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a leading front matter block from the body
///
/// Returns `(None, text)` unless the text starts with a `---` line that has
/// a matching closing `---` line.
pub fn split_front_matter(text: &str) -> (Option<FrontMatter>, &str) {
    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return (None, text),
    }

    let start = text.find('\n').map_or(text.len(), |i| i + 1);
    let mut offset = start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let block = &text[start..offset];
            let body = &text[offset + line.len()..];
            return (Some(FrontMatter::parse(block)), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Prefix `body` with a rendered block, unless there is nothing to render
pub fn join_front_matter(front: Option<&FrontMatter>, body: &str) -> String {
    match front {
        Some(fm) if !fm.is_empty() => {
            let mut out = fm.render();
            out.push_str(body);
            out
        }
        _ => body.to_string(),
    }
}
