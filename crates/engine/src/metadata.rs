//! Entry metadata derived from document content
//!
//! Front matter wins over inference. Without front matter, the title comes
//! from the first heading, the description from the first paragraph and the
//! type from the path and body shape.

use memvault_core::{EntryType, IndexEntry};
use memvault_document::{parse, split_front_matter};

/// Longest description kept, in characters
pub const DESCRIPTION_MAX_CHARS: usize = 200;

/// Refresh `entry`'s descriptive fields from `text`
///
/// Access statistics, archive state and edit counters are not touched.
pub fn describe(entry: &mut IndexEntry, text: &str) {
    let (front, body) = split_front_matter(text);
    let doc = parse(body);

    entry.entry_type = front
        .as_ref()
        .and_then(|f| f.get("type"))
        .and_then(|t| serde_json::from_value::<EntryType>(t.trim().to_ascii_lowercase().into()).ok())
        .unwrap_or_else(|| EntryType::infer(&entry.path, body));

    if let Some(title) = front
        .as_ref()
        .and_then(|f| f.get("title"))
        .or_else(|| doc.first_heading())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        entry.title = title.to_string();
    }

    if let Some(description) = front
        .as_ref()
        .and_then(|f| f.get("description"))
        .or_else(|| doc.first_paragraph())
    {
        entry.description = truncate_chars(description.trim(), DESCRIPTION_MAX_CHARS);
    }

    if let Some(front) = &front {
        if front.get("tags").is_some() {
            entry.tags = front.tags();
        }
        if front.get("aliases").is_some() {
            entry.aliases = front.aliases();
        }
        if let Some(priority) = front.context_priority() {
            entry.context_priority = priority;
        }
        if front.get("pinned").is_some() {
            entry.pinned = front.pinned();
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
