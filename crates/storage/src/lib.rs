//! Storage layer for MemVault
//!
//! This crate implements everything below the index:
//! - BlobStore: byte persistence (local directory or in-memory)
//! - MirroredStore: local store with an optional remote mirror
//! - ContentSplitter: size-bounded splitting and reassembly of documents
//! - TieredCache: hot/cold LRU tiers over an archive tier
//! - WriteTransaction: backup-before-rewrite with restore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod mirror;
pub mod split;
pub mod store;
pub mod transaction;

pub use cache::{ArchiveTier, BlobArchive, MemoryArchive, Tier, TieredCache};
pub use mirror::{MemoryRemote, MirroredStore, RemoteStore};
pub use split::{
    pack_greedy, plan_parts, reconstruct, semantic_blocks, ContentSplitter, RangeRead,
    SplitOutcome, BLOCK_END, BLOCK_START,
};
pub use store::{BlobStore, LocalStore, MemoryStore};
pub use transaction::{
    latest_backup, list_backups, prune_backups, restore_latest, WriteTransaction, BACKUP_ROOT,
};
