//! On-disk index file formats
//!
//! The index is a root descriptor plus one shard file per category:
//!
//! ```text
//! entries/index.json            { "type": "index-root", "branches": [ { "category", "path" } ] }
//! entries/<cat>/index.json      { "type": "index-branch", "category", "parts"?, "files": [ { "file", ... } ] }
//! entries/<cat>/index.part2.json   same shape, next slice of "files"
//! ```
//!
//! A primary with parts records the total file count in `parts`, so a
//! missing part is detected instead of read as a shorter shard.
//!
//! Both top-level objects have a closed key set. A file that does not parse
//! into these shapes, or carries the wrong `type` tag, is a schema violation
//! and the load that encountered it fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::entry::{ContextPriority, EntryType, IndexEntry};
use crate::error::ValidationError;
use crate::path::{canonicalize_entry_path, in_namespace, join, parent_dir};

/// `type` tag of the root descriptor
pub const ROOT_INDEX_TYPE: &str = "index-root";

/// `type` tag of a shard file
pub const SHARD_INDEX_TYPE: &str = "index-branch";

/// Root descriptor file name inside the entries root
pub const ROOT_INDEX_FILE: &str = "index.json";

/// One `(category, shardPath)` descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchDescriptor {
    /// Category key
    pub category: String,
    /// Shard primary file, relative to the entries root
    pub path: String,
}

impl BranchDescriptor {
    /// Directory prefix every entry of this shard lives under
    pub fn namespace(&self) -> &str {
        parent_dir(&self.path)
    }
}

/// Root descriptor enumerating category shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootIndex {
    /// Must be [`ROOT_INDEX_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Declared shards, in insertion order
    pub branches: Vec<BranchDescriptor>,
}

impl Default for RootIndex {
    fn default() -> Self {
        RootIndex {
            kind: ROOT_INDEX_TYPE.to_string(),
            branches: Vec::new(),
        }
    }
}

impl RootIndex {
    /// Parse and schema-check a root descriptor
    pub fn parse(file: &str, bytes: &[u8]) -> Result<Self, ValidationError> {
        let root: RootIndex = serde_json::from_slice(bytes).map_err(|e| schema(file, e))?;
        root.validate(file)?;
        Ok(root)
    }

    /// Check the structural invariants of the descriptor
    pub fn validate(&self, file: &str) -> Result<(), ValidationError> {
        if self.kind != ROOT_INDEX_TYPE {
            return Err(schema(
                file,
                format!("expected type '{}', found '{}'", ROOT_INDEX_TYPE, self.kind),
            ));
        }

        let mut categories = HashSet::new();
        let mut namespaces = HashSet::new();
        for branch in &self.branches {
            if branch.category.trim().is_empty() {
                return Err(schema(file, "branch with empty category"));
            }
            if !categories.insert(branch.category.as_str()) {
                return Err(schema(
                    file,
                    format!("duplicate category '{}'", branch.category),
                ));
            }
            let canonical = canonicalize_entry_path(&branch.path)?;
            if canonical != branch.path {
                return Err(schema(
                    file,
                    format!("shard path '{}' is not canonical", branch.path),
                ));
            }
            if branch.namespace().is_empty() {
                return Err(schema(
                    file,
                    format!("shard path '{}' must live in a category directory", branch.path),
                ));
            }
            if !namespaces.insert(branch.namespace()) {
                return Err(schema(
                    file,
                    format!("namespace '{}' declared twice", branch.namespace()),
                ));
            }
        }
        Ok(())
    }

    /// Serialize to pretty JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Find a shard by category
    pub fn branch(&self, category: &str) -> Option<&BranchDescriptor> {
        self.branches.iter().find(|b| b.category == category)
    }

    /// Locate the shard whose namespace covers `path`
    ///
    /// Nested namespaces are allowed; the longest covering namespace owns the
    /// path. No covering namespace, or two of the same length, is an error.
    pub fn shard_for(&self, path: &str) -> Result<&BranchDescriptor, ValidationError> {
        let matches: Vec<&BranchDescriptor> = self
            .branches
            .iter()
            .filter(|b| in_namespace(path, b.namespace()))
            .collect();
        let longest = matches
            .iter()
            .map(|b| b.namespace().len())
            .max()
            .ok_or_else(|| ValidationError::NoMatchingShard(path.to_string()))?;
        let mut owners = matches.into_iter().filter(|b| b.namespace().len() == longest);
        let owner = owners
            .next()
            .ok_or_else(|| ValidationError::NoMatchingShard(path.to_string()))?;
        let extra = owners.count();
        if extra > 0 {
            return Err(ValidationError::AmbiguousShard {
                path: path.to_string(),
                count: extra + 1,
            });
        }
        Ok(owner)
    }
}

/// One entry as stored in a shard file
///
/// `file` is relative to the shard's directory. Every other field is
/// optional on disk; unknown fields are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardRecord {
    /// Document file, relative to the category directory
    pub file: String,
    /// Document category
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Alternative names
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// Importance label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_priority: Option<ContextPriority>,
    /// Exempt from archiving and decay
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned: bool,
    /// Last content change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Last read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Number of reads
    #[serde(default)]
    pub access_count: u64,
    /// Number of writes
    #[serde(default)]
    pub edit_count: u64,
    /// Moved to the archive namespace
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
    /// Archive location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
    /// Fields this version does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ShardRecord {
    /// Convert to an in-memory entry rooted at `namespace`
    pub fn into_entry(self, namespace: &str) -> Result<IndexEntry, ValidationError> {
        let path = canonicalize_entry_path(&join(namespace, &self.file))?;
        let mut entry = IndexEntry::new(path, self.last_modified.unwrap_or_default());
        entry.entry_type = self
            .entry_type
            .unwrap_or_else(|| EntryType::infer(&entry.path, ""));
        if let Some(title) = self.title {
            entry.title = title;
        }
        entry.description = self.description.unwrap_or_default();
        entry.tags = self.tags;
        entry.aliases = self.aliases;
        entry.context_priority = self.context_priority.unwrap_or_default();
        entry.pinned = self.pinned;
        entry.last_accessed = self.last_accessed;
        entry.access_count = self.access_count;
        entry.edit_count = self.edit_count;
        entry.archived = self.archived;
        entry.archive_path = self.archive_path;
        entry.extra = self.extra;
        Ok(entry)
    }

    /// Build the on-disk record of an entry in `namespace`
    pub fn from_entry(entry: &IndexEntry, namespace: &str) -> Self {
        let prefix_len = if namespace.is_empty() {
            0
        } else {
            namespace.trim_end_matches('/').len() + 1
        };
        let file = entry.path.get(prefix_len..).unwrap_or(&entry.path).to_string();
        ShardRecord {
            file,
            entry_type: Some(entry.entry_type),
            title: Some(entry.title.clone()),
            description: if entry.description.is_empty() {
                None
            } else {
                Some(entry.description.clone())
            },
            tags: entry.tags.clone(),
            aliases: entry.aliases.clone(),
            context_priority: Some(entry.context_priority),
            pinned: entry.pinned,
            last_modified: Some(entry.last_modified),
            last_accessed: entry.last_accessed,
            access_count: entry.access_count,
            edit_count: entry.edit_count,
            archived: entry.archived,
            archive_path: entry.archive_path.clone(),
            extra: entry.extra.clone(),
        }
    }
}

/// A shard file (primary or part)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardFile {
    /// Must be [`SHARD_INDEX_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Category key
    pub category: String,
    /// Files making up the shard, primary included; set on a split primary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<usize>,
    /// Entry records, in order
    pub files: Vec<ShardRecord>,
}

impl ShardFile {
    /// Create a shard file for `category`
    pub fn new(category: impl Into<String>, files: Vec<ShardRecord>) -> Self {
        ShardFile {
            kind: SHARD_INDEX_TYPE.to_string(),
            category: category.into(),
            parts: None,
            files,
        }
    }

    /// Parse and schema-check a shard file
    pub fn parse(file: &str, expected_category: &str, bytes: &[u8]) -> Result<Self, ValidationError> {
        let shard: ShardFile = serde_json::from_slice(bytes).map_err(|e| schema(file, e))?;
        if shard.kind != SHARD_INDEX_TYPE {
            return Err(schema(
                file,
                format!("expected type '{}', found '{}'", SHARD_INDEX_TYPE, shard.kind),
            ));
        }
        if shard.category != expected_category {
            return Err(schema(
                file,
                format!(
                    "category '{}' does not match root descriptor '{}'",
                    shard.category, expected_category
                ),
            ));
        }
        if shard.parts == Some(0) {
            return Err(schema(file, "part count must be at least 1"));
        }
        if let Some(record) = shard.files.iter().find(|r| r.file.trim().is_empty()) {
            return Err(schema(file, format!("record with empty file: {:?}", record)));
        }
        Ok(shard)
    }

    /// Serialize to pretty JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// File name of shard part `n` (n >= 2) for a primary shard path
///
/// `notes/index.json` part 2 is `notes/index.part2.json`.
pub fn shard_part_path(primary: &str, n: usize) -> String {
    let dir = parent_dir(primary);
    let name = crate::path::file_name(primary);
    let (stem, ext) = crate::path::split_extension(name);
    join(dir, &format!("{}.part{}{}", stem, n, ext))
}

fn schema(file: &str, reason: impl ToString) -> ValidationError {
    ValidationError::Schema {
        file: file.to_string(),
        reason: reason.to_string(),
    }
}
