//! Sharded index store
//!
//! The index is a root descriptor plus one shard per category. All shards
//! are held in memory; mutations mark a shard dirty and [`IndexStore::commit`]
//! writes it back with a compare-and-swap on the shard version.
//!
//! Single upserts and removals are committed unguarded. Whole-shard
//! rewrites ([`IndexStore::rebuild_shard`]) and bulk removals go through the
//! [`ConsistencyGuard`] first.

pub mod aging;
pub mod guard;
pub mod priority;
pub mod shard;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use memvault_core::path::{entry_storage_key, in_namespace, join};
use memvault_core::{
    validate_entry_path, BranchDescriptor, Error, IndexEntry, Result, RootIndex,
    ValidationError, ROOT_INDEX_FILE,
};
use memvault_storage::BlobStore;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::paths::{root_index_key, AUDIT_LOG_KEY};

pub use aging::{AgingAction, AgingPolicy};
pub use guard::{CommitOutcome, ConsistencyGuard, GuardReport};
pub use shard::LoadedShard;
pub use validate::ValidationReport;

/// Result of a bulk removal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRemoval {
    /// Paths removed and committed
    pub removed: Vec<String>,
    /// Per-shard removals the guard refused
    pub aborted: Vec<GuardReport>,
}

/// In-memory index backed by shard files
pub struct IndexStore {
    store: Arc<dyn BlobStore>,
    root: RootIndex,
    /// Same order as `root.branches`
    shards: Vec<LoadedShard>,
    shard_max_bytes: u64,
    reserved: Vec<String>,
    auto_clean: bool,
    guard: ConsistencyGuard,
    last_validation: Option<ValidationReport>,
}

impl IndexStore {
    /// Load the root descriptor and every shard
    ///
    /// A missing root means an empty index. Any schema violation, or a
    /// declared shard whose primary file is missing, fails the open.
    pub async fn open(store: Arc<dyn BlobStore>, config: &VaultConfig) -> Result<Self> {
        let root_key = root_index_key();
        let root = match store.read(&root_key).await {
            Ok(bytes) => RootIndex::parse(&root_key, &bytes)?,
            Err(e) if e.is_not_found() => RootIndex::default(),
            Err(e) => return Err(e),
        };

        let mut shards = Vec::with_capacity(root.branches.len());
        for branch in &root.branches {
            shards.push(shard::load_shard(store.as_ref(), branch).await?);
        }

        info!(
            shards = shards.len(),
            entries = shards.iter().map(|s| s.entries.len()).sum::<usize>(),
            "Opened index"
        );
        Ok(IndexStore {
            store,
            root,
            shards,
            shard_max_bytes: config.index.shard_max_bytes,
            reserved: config.index.reserved_namespaces.clone(),
            auto_clean: config.index.auto_clean,
            guard: ConsistencyGuard::from(&config.guard),
            last_validation: None,
        })
    }

    /// Root descriptor
    pub fn root(&self) -> &RootIndex {
        &self.root
    }

    /// Declared categories, in root order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.root.branches.iter().map(|b| b.category.as_str())
    }

    /// Declare a category whose entries live under `namespace`
    ///
    /// Writes an empty shard and then the updated root. Registering the
    /// same category with the same namespace again is a no-op.
    pub async fn register_category(&mut self, category: &str, namespace: &str) -> Result<()> {
        let namespace = validate_entry_path(namespace, &self.reserved)?;
        let path = join(&namespace, ROOT_INDEX_FILE);
        let root_key = root_index_key();

        if let Some(existing) = self.root.branch(category) {
            if existing.path == path {
                return Ok(());
            }
            return Err(ValidationError::Schema {
                file: root_key,
                reason: format!(
                    "category '{}' already declared at '{}'",
                    category, existing.path
                ),
            }
            .into());
        }

        // A nested namespace would take over entries another shard holds.
        if let Some(owned) = self.entries().find(|e| in_namespace(&e.path, &namespace)) {
            return Err(ValidationError::Schema {
                file: root_key,
                reason: format!(
                    "namespace '{}' already holds '{}' from another category",
                    namespace, owned.path
                ),
            }
            .into());
        }

        let descriptor = BranchDescriptor {
            category: category.to_string(),
            path,
        };
        let mut next = self.root.clone();
        next.branches.push(descriptor.clone());
        next.validate(&root_key)?;

        let mut shard = LoadedShard::empty(descriptor);
        let version = shard::persisted_version(self.store.as_ref(), &shard.descriptor).await?;
        if version != shard::ABSENT_VERSION {
            // Reuse whatever a previous root declared at this location.
            shard = shard::load_shard(self.store.as_ref(), &shard.descriptor).await?;
        } else {
            shard::persist_shard(self.store.as_ref(), &mut shard, self.shard_max_bytes).await?;
        }
        self.store.write(&root_key, &next.to_bytes()?).await?;

        info!(category, namespace = %namespace, "Registered category");
        self.root = next;
        self.shards.push(shard);
        Ok(())
    }

    /// Shard owning `path`
    pub fn shard_for(&self, path: &str) -> Result<&BranchDescriptor> {
        Ok(self.root.shard_for(path)?)
    }

    fn shard_index(&self, category: &str) -> Result<usize> {
        self.shards
            .iter()
            .position(|s| s.descriptor.category == category)
            .ok_or_else(|| Error::NotFound(format!("category '{}'", category)))
    }

    fn shard_index_for(&self, path: &str) -> Result<usize> {
        let category = self.root.shard_for(path)?.category.clone();
        self.shard_index(&category)
    }

    fn locate(&self, path: &str) -> Option<(usize, usize)> {
        self.shards
            .iter()
            .enumerate()
            .find_map(|(s, shard)| shard.position(path).map(|e| (s, e)))
    }

    /// Entry at `path`
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.locate(path).map(|(s, e)| &self.shards[s].entries[e])
    }

    /// Every entry, shard by shard in root order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.shards.iter().flat_map(|s| s.entries.iter())
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.len()).sum()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaded shard for `category`
    pub fn shard(&self, category: &str) -> Option<&LoadedShard> {
        self.shards.iter().find(|s| s.descriptor.category == category)
    }

    /// Insert or replace the entry at `entry.path`
    ///
    /// Returns the owning category. The shard is marked dirty but not
    /// committed.
    pub fn upsert(&mut self, mut entry: IndexEntry) -> Result<String> {
        entry.path = validate_entry_path(&entry.path, &self.reserved)?;
        let idx = self.shard_index_for(&entry.path)?;
        let shard = &mut self.shards[idx];
        match shard.position(&entry.path) {
            Some(pos) => shard.entries[pos] = entry,
            None => shard.entries.push(entry),
        }
        shard.dirty = true;
        Ok(shard.descriptor.category.clone())
    }

    /// Remove the entry at `path` without committing
    pub fn remove(&mut self, path: &str) -> Result<Option<(String, IndexEntry)>> {
        let idx = self.shard_index_for(path)?;
        let shard = &mut self.shards[idx];
        Ok(shard.position(path).map(|pos| {
            shard.dirty = true;
            (shard.descriptor.category.clone(), shard.entries.remove(pos))
        }))
    }

    /// Apply `f` to the entry at `path`, marking its shard dirty
    pub fn update<F: FnOnce(&mut IndexEntry)>(&mut self, path: &str, f: F) -> bool {
        match self.locate(path) {
            Some((s, e)) => {
                f(&mut self.shards[s].entries[e]);
                self.shards[s].dirty = true;
                true
            }
            None => false,
        }
    }

    /// Record a read of `path`; persisted on the next flush
    pub fn touch(&mut self, path: &str, now: DateTime<Utc>) -> bool {
        self.update(path, |entry| entry.touch(now))
    }

    /// Persist one shard if its on-disk version is unchanged since load
    ///
    /// # Errors
    ///
    /// [`Error::VersionConflict`] when another writer changed the shard.
    pub async fn commit(&mut self, category: &str) -> Result<u64> {
        let idx = self.shard_index(category)?;
        let expected = self.shards[idx].version;
        let actual = shard::persisted_version(self.store.as_ref(), &self.shards[idx].descriptor).await?;
        if actual != expected {
            return Err(Error::VersionConflict {
                path: entry_storage_key(&self.shards[idx].descriptor.path),
                expected,
                actual,
            });
        }

        let version =
            shard::persist_shard(self.store.as_ref(), &mut self.shards[idx], self.shard_max_bytes)
                .await?;
        debug!(
            category,
            entries = self.shards[idx].entries.len(),
            files = self.shards[idx].files,
            "Committed shard"
        );
        Ok(version)
    }

    /// Discard in-memory changes to a shard and reload it from the store
    pub async fn reload(&mut self, category: &str) -> Result<()> {
        let idx = self.shard_index(category)?;
        let loaded = shard::load_shard(self.store.as_ref(), &self.shards[idx].descriptor).await?;
        self.shards[idx] = loaded;
        Ok(())
    }

    /// Commit every dirty shard; returns how many were written
    pub async fn flush(&mut self) -> Result<usize> {
        let dirty: Vec<String> = self
            .shards
            .iter()
            .filter(|s| s.dirty)
            .map(|s| s.descriptor.category.clone())
            .collect();
        for category in &dirty {
            self.commit(category).await?;
        }
        Ok(dirty.len())
    }

    /// Replace a shard's entries wholesale, behind the consistency guard
    ///
    /// On abort the shard is left as it was and the anomaly is appended to
    /// the audit log.
    pub async fn rebuild_shard(
        &mut self,
        category: &str,
        entries: Vec<IndexEntry>,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let idx = self.shard_index(category)?;
        let shard_file = entry_storage_key(&self.shards[idx].descriptor.path);

        let mut next = BTreeSet::new();
        for entry in &entries {
            validate::check_path(&self.root, &self.reserved, &entry.path)?;
            if self.root.shard_for(&entry.path)?.category != category {
                return Err(ValidationError::Schema {
                    file: shard_file,
                    reason: format!("entry '{}' belongs to another shard", entry.path),
                }
                .into());
            }
            if !next.insert(entry.path.clone()) {
                return Err(ValidationError::Schema {
                    file: shard_file,
                    reason: format!("duplicate entry '{}'", entry.path),
                }
                .into());
            }
        }

        let previous = &self.shards[idx].persisted;
        if let Some(report) = self.guard.check(category, previous, &next, now) {
            guard::append_audit(self.store.as_ref(), AUDIT_LOG_KEY, &report).await?;
            return Ok(CommitOutcome::Aborted(report));
        }

        let added = next.difference(previous).count();
        let removed = previous.difference(&next).count();
        let count = entries.len();

        let old = std::mem::replace(&mut self.shards[idx].entries, entries);
        let was_dirty = std::mem::replace(&mut self.shards[idx].dirty, true);
        if let Err(e) = self.commit(category).await {
            self.shards[idx].entries = old;
            self.shards[idx].dirty = was_dirty;
            return Err(e);
        }

        info!(category, added, removed, entries = count, "Rebuilt shard");
        Ok(CommitOutcome::Committed {
            added,
            removed,
            entries: count,
        })
    }

    /// Remove many entries, one guarded rewrite per shard
    pub async fn remove_entries(&mut self, paths: &[String], now: DateTime<Utc>) -> Result<BulkRemoval> {
        let mut by_category: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for path in paths {
            let category = self.root.shard_for(path)?.category.clone();
            by_category.entry(category).or_default().insert(path.clone());
        }

        let mut result = BulkRemoval::default();
        for (category, doomed) in by_category {
            let idx = self.shard_index(&category)?;
            let next: Vec<IndexEntry> = self.shards[idx]
                .entries
                .iter()
                .filter(|e| !doomed.contains(&e.path))
                .cloned()
                .collect();
            let present: Vec<String> = self.shards[idx]
                .entries
                .iter()
                .filter(|e| doomed.contains(&e.path))
                .map(|e| e.path.clone())
                .collect();

            match self.rebuild_shard(&category, next, now).await? {
                CommitOutcome::Committed { .. } => result.removed.extend(present),
                CommitOutcome::Aborted(report) => result.aborted.push(report),
            }
        }
        Ok(result)
    }

    /// All entries in priority order
    pub fn ordered(&self) -> Vec<&IndexEntry> {
        priority::order(self.entries())
    }

    /// The top `cap` entries eligible for the active working set
    pub fn active_set(&self, cap: usize) -> Vec<&IndexEntry> {
        priority::active_set(self.entries(), cap)
    }

    /// Check every entry's path and document
    ///
    /// With auto-clean enabled, unpinned entries whose document is missing
    /// are removed through the guard.
    pub async fn validate(&mut self, now: DateTime<Utc>) -> Result<ValidationReport> {
        let mut report = ValidationReport::new(now);
        let mut cleanable = Vec::new();
        for entry in self.entries() {
            if let Err(e) = validate::check_path(&self.root, &self.reserved, &entry.path) {
                warn!(path = %entry.path, error = %e, "Invalid index entry");
                report.invalid.push(entry.path.clone());
                continue;
            }
            if self.store.exists(&validate::document_key(entry)).await? {
                report.valid.push(entry.path.clone());
            } else {
                report.missing.push(entry.path.clone());
                if !entry.pinned {
                    cleanable.push(entry.path.clone());
                }
            }
        }

        if self.auto_clean && !cleanable.is_empty() {
            let bulk = self.remove_entries(&cleanable, now).await?;
            report.removed = bulk.removed;
            report.aborted = bulk.aborted;
        }

        info!(
            valid = report.valid.len(),
            missing = report.missing.len(),
            invalid = report.invalid.len(),
            removed = report.removed.len(),
            "Validated index"
        );
        self.last_validation = Some(report.clone());
        Ok(report)
    }

    /// Report of the most recent validation
    pub fn last_validation(&self) -> Option<&ValidationReport> {
        self.last_validation.as_ref()
    }

    /// Every guard abort recorded so far
    pub async fn audit_log(&self) -> Result<Vec<GuardReport>> {
        match self.store.read(AUDIT_LOG_KEY).await {
            Ok(bytes) => guard::parse_audit(&bytes),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
