//! MemVault - persistent memory for long-running assistants
//!
//! MemVault keeps a hierarchy of text documents ("memory entries") on disk,
//! indexed by category shards, cached in hot/cold/archive tiers, and kept
//! under size limits by splitting large documents into parts.
//!
//! # Quick Start
//!
//! ```no_run
//! use memvault::{MemVault, MergeOptions, WriteOptions};
//!
//! # async fn demo() -> memvault::Result<()> {
//! let mut vault = MemVault::open("./vault").await?;
//! vault.register_category("projects", "projects").await?;
//!
//! vault
//!     .write_document(
//!         "projects/garden.md",
//!         "## Tasks\n- [ ] order seeds\n",
//!         WriteOptions::merged(MergeOptions::deduped()),
//!     )
//!     .await?;
//!
//! let text = vault.read_document("projects/garden.md").await?;
//! vault.flush().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`memvault_document`]: parse, merge, dedupe and serialize documents
//! - [`memvault_storage`]: blob stores, content splitter, tiered cache,
//!   write transactions, remote mirror
//! - [`memvault_engine`]: sharded index store and the [`MemVault`] context

pub use memvault_core::{
    ContextPriority, EntryType, Error, IndexEntry, Result, StorageLimitError, StorageLimits,
    ValidationError,
};
pub use memvault_document::{
    dedupe, merge, merge_text, parse, serialize, Document, DocumentNode, FrontMatter,
    MergeOptions, NodeKind,
};
pub use memvault_engine::{
    CommitOutcome, GuardReport, MaintenanceReport, MemVault, ValidationReport, VaultConfig,
    WriteOptions, WriteOutcome,
};
pub use memvault_storage::{
    ArchiveTier, BlobStore, LocalStore, MemoryRemote, MemoryStore, RangeRead, RemoteStore, Tier,
};

pub use memvault_core;
pub use memvault_document;
pub use memvault_engine;
pub use memvault_storage;
