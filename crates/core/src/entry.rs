//! Index entry types
//!
//! This module defines the metadata record the index keeps for every
//! document:
//! - IndexEntry: path, classification, priority and access statistics
//! - ContextPriority: coarse importance label with a total order
//! - EntryType: closed set of document categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::path::{file_name, split_extension};

/// Importance label governing inclusion in the active working set
///
/// The derived order is the sort key: `High < Medium < Low`, so an
/// ascending sort puts the most important entries first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextPriority {
    /// Always considered for the working set
    High,
    /// Considered after all high entries
    #[default]
    Medium,
    /// Never promoted into the working set
    Low,
}

impl ContextPriority {
    /// One level less important, saturating at `Low`
    pub fn step_down(self) -> Self {
        match self {
            ContextPriority::High => ContextPriority::Medium,
            ContextPriority::Medium | ContextPriority::Low => ContextPriority::Low,
        }
    }

    /// Lowercase name as written in front matter and index files
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextPriority::High => "high",
            ContextPriority::Medium => "medium",
            ContextPriority::Low => "low",
        }
    }
}

impl fmt::Display for ContextPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(ContextPriority::High),
            "medium" => Ok(ContextPriority::Medium),
            "low" => Ok(ContextPriority::Low),
            other => Err(format!("unknown context priority '{}'", other)),
        }
    }
}

/// Document category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Free-form note (fallback)
    #[default]
    Note,
    /// Project description or status
    Project,
    /// Facts about a person
    Person,
    /// Checklist or todo list
    Task,
    /// Dated log entry
    Journal,
    /// Reference material
    Reference,
}

impl EntryType {
    /// Infer a category from the file name, falling back to content shape
    ///
    /// Name keywords win; a document whose body is mostly checklist items
    /// is a task; anything else is a note.
    pub fn infer(path: &str, content: &str) -> Self {
        let (stem, _) = split_extension(file_name(path));
        let haystack = format!("{}/{}", path.to_ascii_lowercase(), stem.to_ascii_lowercase());

        if haystack.contains("journal") || haystack.contains("diary") || looks_dated(stem) {
            return EntryType::Journal;
        }
        if haystack.contains("project") {
            return EntryType::Project;
        }
        if haystack.contains("person") || haystack.contains("people") || haystack.contains("contact")
        {
            return EntryType::Person;
        }
        if haystack.contains("todo") || haystack.contains("task") {
            return EntryType::Task;
        }
        if haystack.contains("reference") || haystack.contains("docs/") {
            return EntryType::Reference;
        }

        let mut lines = 0usize;
        let mut checklist = 0usize;
        for line in content.lines().map(str::trim_start) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            lines += 1;
            if line.starts_with("- [") || line.starts_with("* [") {
                checklist += 1;
            }
        }
        if lines > 0 && checklist * 2 > lines {
            return EntryType::Task;
        }

        EntryType::Note
    }
}

fn looks_dated(stem: &str) -> bool {
    // YYYY-MM-DD prefix
    let bytes = stem.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

/// Metadata record for one document
///
/// `path` is canonical and unique within the index. Entries with
/// `pinned = true` are never archived or decayed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Canonical path relative to the entries root
    pub path: String,
    /// Document category
    pub entry_type: EntryType,
    /// Display title
    pub title: String,
    /// Short description
    pub description: String,
    /// Tags
    pub tags: BTreeSet<String>,
    /// Alternative names
    pub aliases: BTreeSet<String>,
    /// Importance label
    pub context_priority: ContextPriority,
    /// Exempt from archiving and decay
    pub pinned: bool,
    /// Last content change
    pub last_modified: DateTime<Utc>,
    /// Last read, if ever
    pub last_accessed: Option<DateTime<Utc>>,
    /// Number of reads
    pub access_count: u64,
    /// Number of writes
    pub edit_count: u64,
    /// Moved to the archive namespace
    pub archived: bool,
    /// Archive location when archived
    pub archive_path: Option<String>,
    /// Unrecognized fields carried through from the shard file
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl IndexEntry {
    /// Create an entry with default metadata
    pub fn new(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let (stem, _) = split_extension(file_name(&path));
        IndexEntry {
            title: stem.to_string(),
            path,
            entry_type: EntryType::Note,
            description: String::new(),
            tags: BTreeSet::new(),
            aliases: BTreeSet::new(),
            context_priority: ContextPriority::Medium,
            pinned: false,
            last_modified: now,
            last_accessed: None,
            access_count: 0,
            edit_count: 0,
            archived: false,
            archive_path: None,
            extra: BTreeMap::new(),
        }
    }

    /// Most recent of last access and last modification
    pub fn last_touched(&self) -> DateTime<Utc> {
        match self.last_accessed {
            Some(accessed) if accessed > self.last_modified => accessed,
            _ => self.last_modified,
        }
    }

    /// Record a read
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = Some(now);
    }

    /// Record a write
    pub fn record_edit(&mut self, now: DateTime<Utc>) {
        self.edit_count += 1;
        self.last_modified = now;
    }
}
