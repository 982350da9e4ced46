//! Index validation report

use chrono::{DateTime, Utc};
use memvault_core::path::entry_storage_key;
use memvault_core::{validate_entry_path, IndexEntry, RootIndex, ValidationError};
use serde::Serialize;

use super::guard::GuardReport;
use crate::paths::archive_key;

/// Outcome of validating every entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Entries whose document exists
    pub valid: Vec<String>,
    /// Entries whose document is missing
    pub missing: Vec<String>,
    /// Entries with a disallowed path
    pub invalid: Vec<String>,
    /// Missing entries removed by auto-clean
    pub removed: Vec<String>,
    /// Auto-clean removals refused by the consistency guard
    pub aborted: Vec<GuardReport>,
    /// When validation ran
    pub checked_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Empty report stamped `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        ValidationReport {
            valid: Vec::new(),
            missing: Vec::new(),
            invalid: Vec::new(),
            removed: Vec::new(),
            aborted: Vec::new(),
            checked_at: now,
        }
    }

    /// No missing or invalid entries
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

/// Check an entry path is canonical, allowed, and owned by exactly one shard
pub fn check_path(root: &RootIndex, reserved: &[String], path: &str) -> Result<(), ValidationError> {
    let canonical = validate_entry_path(path, reserved)?;
    if canonical != path {
        return Err(ValidationError::Schema {
            file: path.to_string(),
            reason: format!("path is not canonical (expected '{}')", canonical),
        });
    }
    root.shard_for(path)?;
    Ok(())
}

/// Store key the entry's document is expected at
pub fn document_key(entry: &IndexEntry) -> String {
    if entry.archived {
        entry
            .archive_path
            .clone()
            .unwrap_or_else(|| archive_key(&entry.path))
    } else {
        entry_storage_key(&entry.path)
    }
}
