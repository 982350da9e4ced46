//! Core types for MemVault
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error type hierarchy (validation, storage limits, consistency, range)
//! - Path: Entry path canonicalization and namespace checks
//! - Entry: IndexEntry, ContextPriority, EntryType
//! - Index: RootIndex and shard file formats with schema checks
//! - Manifest: SplitManifest format for split documents
//! - Limits: StorageLimits enforced before writes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod error;
pub mod index;
pub mod limits;
pub mod manifest;
pub mod path;

pub use entry::{ContextPriority, EntryType, IndexEntry};
pub use error::{Error, Result, StorageLimitError, ValidationError};
pub use index::{
    shard_part_path, BranchDescriptor, RootIndex, ShardFile, ShardRecord, ROOT_INDEX_FILE,
    ROOT_INDEX_TYPE, SHARD_INDEX_TYPE,
};
pub use limits::StorageLimits;
pub use manifest::{SplitManifest, SplitManifestFile, SPLIT_MANIFEST_FILE};
pub use path::{canonicalize_entry_path, validate_entry_path, ENTRIES_ROOT};
