//! Vault integration tests
//!
//! On-disk scenarios across the index, splitter, cache and maintenance.

#[path = "../common/mod.rs"]
mod common;

mod cache;
mod documents;
mod index;
mod lifecycle;
mod maintenance;
