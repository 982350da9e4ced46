//! Error types for MemVault
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The taxonomy:
//! - `Validation`: malformed path, schema violation, disallowed namespace.
//!   Fatal to the current operation, never retried.
//! - `StorageLimit`: a size quota would be violated. Nothing was written.
//! - `ConsistencyAbort`: the index consistency guard refused a commit. The
//!   previous shard contents are untouched and an audit record exists.
//! - `Range`: a byte range read started beyond the document end.
//! - `NotFound`: missing document, shard, or shard part.

use std::io;
use thiserror::Error;

/// Result type alias for MemVault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for MemVault
#[derive(Debug, Error)]
pub enum Error {
    /// Path, namespace, or schema validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A size quota would be exceeded
    #[error("Storage limit exceeded: {0}")]
    StorageLimit(#[from] StorageLimitError),

    /// The consistency guard refused to commit an index rewrite
    #[error(
        "Consistency guard aborted commit of '{category}': {removed} removed, {added} added (previous {previous})"
    )]
    ConsistencyAbort {
        /// Shard category whose rewrite was refused
        category: String,
        /// Number of paths the rewrite would have added
        added: usize,
        /// Number of paths the rewrite would have removed
        removed: usize,
        /// Entry count of the persisted shard
        previous: usize,
    },

    /// Requested byte offset is outside the reconstructed document
    #[error("Range error: offset {offset} is beyond document size {size}")]
    Range {
        /// Requested start offset
        offset: u64,
        /// Total recorded document size
        size: u64,
    },

    /// Missing document, shard, or shard part
    #[error("Not found: {0}")]
    NotFound(String),

    /// A shard changed on disk between load and commit
    #[error("Version conflict on '{path}': expected {expected:016x}, found {actual:016x}")]
    VersionConflict {
        /// Shard primary file
        path: String,
        /// Version observed at load time
        expected: u64,
        /// Version found at commit time
        actual: u64,
    },

    /// Remote mirror failure
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether this error means the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Validation errors
///
/// Raised for entry paths, shard namespaces, and on-disk index schemas.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Path is empty
    #[error("Path cannot be empty")]
    EmptyPath,

    /// Path contains a NUL byte
    #[error("Path cannot contain NUL bytes")]
    ContainsNul,

    /// Path is absolute
    #[error("Path must be relative to the entries root: {0}")]
    AbsolutePath(String),

    /// Path contains a `..` component
    #[error("Path escapes the entries root: {0}")]
    Traversal(String),

    /// Path lies in a reserved system or plugin namespace
    #[error("Path '{path}' is in reserved namespace '{namespace}'")]
    ReservedNamespace {
        /// Offending path
        path: String,
        /// Namespace it matched
        namespace: String,
    },

    /// File name collides with a shard, manifest or part file
    #[error("File name in '{0}' is reserved for index and split files")]
    ReservedFileName(String),

    /// No shard namespace covers the path
    #[error("No shard namespace matches '{0}'")]
    NoMatchingShard(String),

    /// More than one shard namespace covers the path
    #[error("Path '{path}' matches {count} shard namespaces")]
    AmbiguousShard {
        /// Offending path
        path: String,
        /// Number of matching namespaces
        count: usize,
    },

    /// An index file does not conform to its schema
    #[error("Schema violation in '{file}': {reason}")]
    Schema {
        /// File that failed validation
        file: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Storage limit violations
///
/// Every variant is raised before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageLimitError {
    /// Content is larger than allowed and splitting is disabled
    #[error("File too large: {actual} bytes (max {max})")]
    FileTooLarge {
        /// Content size
        actual: u64,
        /// Configured maximum
        max: u64,
    },

    /// Splitting would produce more parts than allowed
    #[error("Split would produce {actual} parts (max {max})")]
    PartsLimitExceeded {
        /// Number of parts the split would produce
        actual: usize,
        /// Configured maximum
        max: usize,
    },

    /// Projected directory size exceeds the quota
    #[error("Directory '{dir}' would hold {projected} bytes (quota {max})")]
    TotalLimitExceeded {
        /// Directory the quota applies to
        dir: String,
        /// Projected size after the write
        projected: u64,
        /// Configured quota
        max: u64,
    },
}
