//! Split manifest format
//!
//! One `memory_index.json` per directory that holds split documents. The
//! file is a JSON array with one record per split document:
//!
//! ```text
//! [ { "originalFile": "big.md", "parts": ["big.part1.md", ...],
//!     "size": 1258291, "partSize": 524288, "created": "..." } ]
//! ```
//!
//! A document without a record is not split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest file name within a directory
pub const SPLIT_MANIFEST_FILE: &str = "memory_index.json";

/// Record of one split document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitManifest {
    /// Document file name, relative to the manifest's directory
    pub original_file: String,
    /// Part file names in order, relative to the manifest's directory
    pub parts: Vec<String>,
    /// Total size of the reassembled document in bytes
    pub size: u64,
    /// Nominal part size (the last part may be smaller)
    pub part_size: u64,
    /// When the split was written
    pub created: DateTime<Utc>,
    /// Exact size of each part, recorded when parts are of uneven size
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_sizes: Vec<u64>,
}

impl SplitManifest {
    /// Whether every part but the last has exactly `part_size` bytes
    pub fn is_uniform(&self) -> bool {
        if self.part_sizes.is_empty() {
            return true;
        }
        let n = self.part_sizes.len();
        self.part_sizes[..n.saturating_sub(1)]
            .iter()
            .all(|&s| s == self.part_size)
    }

    /// Byte offset at which each part starts
    pub fn part_offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(self.parts.len());
        let mut acc = 0u64;
        for i in 0..self.parts.len() {
            offsets.push(acc);
            acc += match self.part_sizes.get(i) {
                Some(&s) => s,
                None => self.part_size,
            };
        }
        offsets
    }
}

/// Contents of a `memory_index.json` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitManifestFile {
    /// Records, one per split document
    pub records: Vec<SplitManifest>,
}

impl SplitManifestFile {
    /// Parse a manifest file
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize to pretty JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Record for a document, if it is split
    pub fn get(&self, original_file: &str) -> Option<&SplitManifest> {
        self.records.iter().find(|r| r.original_file == original_file)
    }

    /// Insert or replace the record for `manifest.original_file`
    ///
    /// Returns the record it replaced.
    pub fn upsert(&mut self, manifest: SplitManifest) -> Option<SplitManifest> {
        match self
            .records
            .iter_mut()
            .find(|r| r.original_file == manifest.original_file)
        {
            Some(existing) => Some(std::mem::replace(existing, manifest)),
            None => {
                self.records.push(manifest);
                None
            }
        }
    }

    /// Remove the record for a document
    pub fn remove(&mut self, original_file: &str) -> Option<SplitManifest> {
        let idx = self
            .records
            .iter()
            .position(|r| r.original_file == original_file)?;
        Some(self.records.remove(idx))
    }

    /// Whether no document in the directory is split
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
