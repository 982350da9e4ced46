//! Memory engine for MemVault
//!
//! This crate ties the lower layers together:
//! - MemVault: engine context with the document write/read/delete paths
//! - Index: sharded index store with consistency guard, priority order,
//!   aging policy and validation
//! - Config: `memvault.toml` loading and validation
//! - Paths: vault directory layout
//!
//! The engine is the only component that knows about:
//! - How documents map to index entries
//! - When the cache is refreshed and the mirror written
//! - Maintenance scheduling (aging, flushing access statistics)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod index;
pub mod metadata;
pub mod paths;
pub mod vault;

pub use config::{
    AgingConfig, CacheConfig, GuardConfig, IndexConfig, SplitConfig, VaultConfig,
    CONFIG_FILE_NAME,
};
pub use index::{
    AgingAction, AgingPolicy, BulkRemoval, CommitOutcome, ConsistencyGuard, GuardReport,
    IndexStore, ValidationReport,
};
pub use paths::VaultPaths;
pub use vault::{Clock, MaintenanceReport, MemVault, WriteOptions, WriteOutcome};
