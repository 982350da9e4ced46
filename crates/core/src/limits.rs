//! Size limits for documents and directories
//!
//! This module defines the configurable quotas the write path enforces
//! before anything reaches the backing store. Violations return
//! [`StorageLimitError`] and leave the store untouched.

use crate::error::StorageLimitError;

/// Size limits for stored documents
///
/// `max_part_bytes` is both the split threshold and the nominal size of each
/// part. When splitting is disabled, `max_file_bytes` caps a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLimits {
    /// Whether oversized documents are split into parts
    pub split_enabled: bool,

    /// Split threshold and nominal part size in bytes (default: 512KB)
    pub max_part_bytes: u64,

    /// Maximum number of parts per document (default: 64)
    pub max_parts: usize,

    /// Maximum single-file size when splitting is disabled (default: 1MB)
    pub max_file_bytes: u64,

    /// Maximum total bytes stored in one directory (default: 256MB)
    pub max_dir_bytes: u64,
}

impl Default for StorageLimits {
    fn default() -> Self {
        StorageLimits {
            split_enabled: true,
            max_part_bytes: 512 * 1024,      // 512KB
            max_parts: 64,
            max_file_bytes: 1024 * 1024,     // 1MB
            max_dir_bytes: 256 * 1024 * 1024, // 256MB
        }
    }
}

impl StorageLimits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        StorageLimits {
            split_enabled: true,
            max_part_bytes: 256,
            max_parts: 8,
            max_file_bytes: 1024,
            max_dir_bytes: 64 * 1024,
        }
    }

    /// Whether content of `size` bytes must be split
    pub fn needs_split(&self, size: u64) -> bool {
        self.split_enabled && size > self.max_part_bytes
    }

    /// Validate a document that will be stored as a single file
    pub fn check_single_file(&self, size: u64) -> Result<(), StorageLimitError> {
        if !self.split_enabled && size > self.max_file_bytes {
            return Err(StorageLimitError::FileTooLarge {
                actual: size,
                max: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Validate the number of parts a split would produce
    pub fn check_parts(&self, parts: usize) -> Result<(), StorageLimitError> {
        if parts > self.max_parts {
            return Err(StorageLimitError::PartsLimitExceeded {
                actual: parts,
                max: self.max_parts,
            });
        }
        Ok(())
    }

    /// Validate the projected size of a directory after a write
    pub fn check_dir_total(&self, dir: &str, projected: u64) -> Result<(), StorageLimitError> {
        if projected > self.max_dir_bytes {
            return Err(StorageLimitError::TotalLimitExceeded {
                dir: dir.to_string(),
                projected,
                max: self.max_dir_bytes,
            });
        }
        Ok(())
    }
}
