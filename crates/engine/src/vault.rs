//! The vault engine
//!
//! `MemVault` is the one context object every operation goes through. It
//! owns the index, the content cache, the splitter and the (optionally
//! mirrored) blob store; several vaults can live side by side in one
//! process.
//!
//! Write path:
//!
//! ```text
//! validate path ─► locate shard ─► merge with existing (optional)
//!   ─► limit checks ─► backup ─► split + write ─► upsert entry
//!   ─► commit shard (CAS) ─► refresh cache ─► mirror
//! ```
//!
//! Read path: cache, then local store (reassembling parts), then the
//! remote mirror. Reads bump access statistics in memory; they reach disk
//! on [`MemVault::flush`] or [`MemVault::run_maintenance`].

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use memvault_core::path::entry_storage_key;
use memvault_core::{validate_entry_path, ContextPriority, Error, IndexEntry, Result};
use memvault_document::{merge_text, MergeOptions};
use memvault_storage::{
    prune_backups, restore_latest, ArchiveTier, BlobArchive, BlobStore, ContentSplitter, LocalStore,
    MemoryArchive, MemoryStore, MirroredStore, RangeRead, RemoteStore, Tier, TieredCache,
    WriteTransaction,
};
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::index::validate::document_key;
use crate::index::{
    AgingAction, AgingPolicy, BulkRemoval, CommitOutcome, GuardReport, IndexStore,
    ValidationReport,
};
use crate::metadata::describe;
use crate::paths::{archive_key, VaultPaths, CACHE_ARCHIVE_ROOT};

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Options for [`MemVault::write_document`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Merge into the existing document instead of replacing it
    pub merge: Option<MergeOptions>,
    /// Change message passed to the remote mirror
    pub message: Option<String>,
}

impl WriteOptions {
    /// Replace the document
    pub fn replace() -> Self {
        Self::default()
    }

    /// Merge into the existing document
    pub fn merged(options: MergeOptions) -> Self {
        WriteOptions {
            merge: Some(options),
            message: None,
        }
    }

    /// Set the mirror change message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// What a write did
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Canonical entry path
    pub path: String,
    /// Owning category
    pub category: String,
    /// Store keys written (the document, or its parts)
    pub parts: Vec<String>,
    /// Whether the document was split
    pub split: bool,
    /// Logical size in bytes
    pub size: u64,
    /// Backup of the previous content, if there was any
    pub backup: Option<String>,
    /// Remote mirror failure; the local write stands regardless
    pub mirror_error: Option<String>,
}

/// What a maintenance run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    /// Entries moved to the archive
    pub archived: Vec<String>,
    /// Entries whose priority stepped down
    pub decayed: Vec<(String, ContextPriority, ContextPriority)>,
    /// Shards written
    pub flushed: usize,
}

/// Memory vault engine context
pub struct MemVault {
    paths: Option<VaultPaths>,
    config: VaultConfig,
    store: MirroredStore,
    splitter: ContentSplitter,
    index: IndexStore,
    cache: TieredCache,
    clock: Clock,
}

impl std::fmt::Debug for MemVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemVault")
            .field("paths", &self.paths)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemVault {
    /// Open (or create) a vault directory, configured by its `memvault.toml`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let paths = VaultPaths::from_root(dir);
        paths.create_directories()?;
        VaultConfig::write_default_if_missing(&paths.config_file())?;
        let config = VaultConfig::from_file(&paths.config_file())?;
        Self::open_at(paths, config).await
    }

    /// Open (or create) a vault directory with an explicit configuration
    ///
    /// The configuration is written to `memvault.toml` if the vault has none.
    pub async fn open_with_config(dir: impl AsRef<Path>, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let paths = VaultPaths::from_root(dir);
        paths.create_directories()?;
        if !paths.exists() {
            config.write_to_file(&paths.config_file())?;
        }
        Self::open_at(paths, config).await
    }

    async fn open_at(paths: VaultPaths, config: VaultConfig) -> Result<Self> {
        let local: Arc<dyn BlobStore> = Arc::new(LocalStore::new(paths.root()));
        let archive = Box::new(BlobArchive::new(Arc::clone(&local), CACHE_ARCHIVE_ROOT));
        info!(path = %paths.root().display(), "Opening vault");
        Self::assemble(Some(paths), local, archive, config).await
    }

    /// In-memory vault; nothing touches the filesystem
    pub async fn ephemeral(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let local: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
        Self::assemble(None, local, Box::new(MemoryArchive::new()), config).await
    }

    /// Vault over an arbitrary blob store
    pub async fn with_store(store: Arc<dyn BlobStore>, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let archive = Box::new(BlobArchive::new(Arc::clone(&store), CACHE_ARCHIVE_ROOT));
        Self::assemble(None, store, archive, config).await
    }

    async fn assemble(
        paths: Option<VaultPaths>,
        local: Arc<dyn BlobStore>,
        archive: Box<dyn ArchiveTier>,
        config: VaultConfig,
    ) -> Result<Self> {
        let mut index = IndexStore::open(Arc::clone(&local), &config).await?;
        if config.index.validate_on_open {
            index.validate(Utc::now()).await?;
        }
        Ok(MemVault {
            paths,
            splitter: ContentSplitter::new(config.split.limits(), config.split.semantic),
            cache: TieredCache::new(
                config.cache.hot_capacity,
                config.cache.cold_capacity,
                archive,
            ),
            store: MirroredStore::new(local),
            index,
            config,
            clock: Arc::new(Utc::now),
        })
    }

    /// Attach a remote mirror
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.store = self.store.with_remote(remote);
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Directory layout, for on-disk vaults
    pub fn paths(&self) -> Option<&VaultPaths> {
        self.paths.as_ref()
    }

    /// Configuration in force
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The index store
    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    /// Local blob store
    pub fn store(&self) -> &dyn BlobStore {
        self.store.local()
    }

    /// Entry at `path`
    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.index.get(path)
    }

    /// Cache tier currently holding `path` in memory
    pub fn cache_tier(&self, path: &str) -> Option<Tier> {
        self.cache.tier_of(path)
    }

    fn canonical(&self, path: &str) -> Result<String> {
        Ok(validate_entry_path(
            path,
            &self.config.index.reserved_namespaces,
        )?)
    }

    /// Declare a category whose entries live under `namespace`
    pub async fn register_category(&mut self, category: &str, namespace: &str) -> Result<()> {
        self.index.register_category(category, namespace).await
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Create, replace, or merge into a document
    ///
    /// Limit violations fail before anything is written. A failure after
    /// the document was written restores the previous content. A remote
    /// mirror failure is reported in the outcome and does not undo the write.
    pub async fn write_document(
        &mut self,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<WriteOutcome> {
        let now = self.now();
        let path = self.canonical(path)?;
        let category = self.index.shard_for(&path)?.category.clone();
        let key = entry_storage_key(&path);
        let local = self.store.local_handle();
        let previous = self.index.get(&path).cloned();

        let text = match options.merge {
            Some(merge) => {
                let source = previous.as_ref().map_or_else(|| key.clone(), document_key);
                let existing = match self.splitter.read(local.as_ref(), &source).await {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(e) if e.is_not_found() => String::new(),
                    Err(e) => return Err(e),
                };
                merge_text(&existing, content, merge)
            }
            None => content.to_string(),
        };

        self.splitter.check(local.as_ref(), &key, text.as_bytes()).await?;
        let tx = WriteTransaction::begin(local.as_ref(), &self.splitter, &key, now).await?;
        let outcome = match self.splitter.write(local.as_ref(), &key, text.as_bytes(), now).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.roll_back(tx, e, now).await),
        };

        let mut entry = previous
            .clone()
            .unwrap_or_else(|| IndexEntry::new(path.clone(), now));
        describe(&mut entry, &text);
        entry.record_edit(now);
        let unarchived = entry.archived.then(|| document_key(&entry));
        entry.archived = false;
        entry.archive_path = None;

        self.index.upsert(entry)?;
        if let Err(e) = self.index.commit(&category).await {
            match previous {
                Some(old) => {
                    self.index.upsert(old)?;
                }
                None => {
                    self.index.remove(&path)?;
                }
            }
            return Err(self.roll_back(tx, e, now).await);
        }
        let backup = tx.commit();
        if backup.is_some() {
            let keep = self.config.aging.backup_retention;
            if let Err(e) = prune_backups(local.as_ref(), &key, keep).await {
                warn!(path = %path, error = %e, "Failed to prune backups");
            }
        }

        if let Some(old) = unarchived {
            local.delete(&old).await?;
            debug!(path = %path, "Restored archived entry");
        }
        self.cache.store(&path, text.clone()).await?;

        let message = options
            .message
            .unwrap_or_else(|| format!("Update {}", path));
        let mirror_error = self.store.mirror(&key, text.as_bytes(), &message).await;

        info!(
            path = %path,
            category = %category,
            size = text.len(),
            parts = outcome.parts.len(),
            "Wrote document"
        );
        Ok(WriteOutcome {
            path,
            category,
            split: outcome.is_split(),
            parts: outcome.parts,
            size: text.len() as u64,
            backup,
            mirror_error,
        })
    }

    async fn roll_back(&self, tx: WriteTransaction, cause: Error, now: DateTime<Utc>) -> Error {
        let key = tx.key().to_string();
        if let Err(e) = tx
            .restore(self.store.local(), &self.splitter, now)
            .await
        {
            warn!(key = %key, error = %e, "Failed to restore snapshot");
        }
        cause
    }

    /// Delete a document, its parts, its entry and any cached copy
    ///
    /// Returns whether anything existed.
    pub async fn delete_document(&mut self, path: &str) -> Result<bool> {
        let now = self.now();
        let path = self.canonical(path)?;
        let key = entry_storage_key(&path);
        let local = self.store.local_handle();

        let tx = WriteTransaction::begin(local.as_ref(), &self.splitter, &key, now).await?;
        let mut existed = self.splitter.delete(local.as_ref(), &key).await?;

        if let Some((category, entry)) = self.index.remove(&path)? {
            if let Err(e) = self.index.commit(&category).await {
                self.index.upsert(entry)?;
                return Err(self.roll_back(tx, e, now).await);
            }
            if entry.archived {
                local.delete(&document_key(&entry)).await?;
            }
            existed = true;
        }
        let _ = tx.commit();

        self.cache.invalidate(&path).await?;
        info!(path = %path, existed, "Deleted document");
        Ok(existed)
    }

    /// Restore the newest backup of a document
    ///
    /// Returns the backup key that was restored.
    pub async fn rollback(&mut self, path: &str) -> Result<String> {
        let now = self.now();
        let path = self.canonical(path)?;
        let key = entry_storage_key(&path);
        let local = self.store.local_handle();

        let backup = restore_latest(local.as_ref(), &self.splitter, &key, now).await?;
        let bytes = self.splitter.read(local.as_ref(), &key).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if let Some(mut entry) = self.index.get(&path).cloned() {
            describe(&mut entry, &text);
            entry.record_edit(now);
            let category = self.index.upsert(entry)?;
            self.index.commit(&category).await?;
        }
        self.cache.store(&path, text.clone()).await?;
        if let Some(e) = self
            .store
            .mirror(&key, text.as_bytes(), &format!("Roll back {}", path))
            .await
        {
            warn!(path = %path, error = %e, "Rollback not mirrored");
        }
        Ok(backup)
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Read a whole document
    pub async fn read_document(&mut self, path: &str) -> Result<String> {
        let now = self.now();
        let path = self.canonical(path)?;
        let text = match self.cache.load(&path).await? {
            Some(text) => text,
            None => {
                let text = self.load_document(&path).await?;
                self.cache.store(&path, text.clone()).await?;
                text
            }
        };
        self.index.touch(&path, now);
        Ok(text)
    }

    /// Read `len` bytes of a document starting at `offset`
    pub async fn read_range(&mut self, path: &str, offset: u64, len: u64) -> Result<RangeRead> {
        let now = self.now();
        let path = self.canonical(path)?;
        let key = self.storage_key(&path);
        let read = self
            .splitter
            .read_range(self.store.local(), &key, offset, len)
            .await?;
        self.index.touch(&path, now);
        Ok(read)
    }

    fn storage_key(&self, path: &str) -> String {
        match self.index.get(path) {
            Some(entry) => document_key(entry),
            None => entry_storage_key(path),
        }
    }

    async fn load_document(&self, path: &str) -> Result<String> {
        let key = self.storage_key(path);
        let bytes = match self.splitter.read(self.store.local(), &key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => match self.store.fetch_remote(&key).await? {
                Some(text) => return Ok(text),
                None => return Err(Error::NotFound(format!("document '{}'", path))),
            },
            Err(e) => return Err(e),
        };
        String::from_utf8(bytes)
            .map_err(|e| Error::Serialization(format!("'{}' is not UTF-8: {}", path, e)))
    }

    // ========================================================================
    // Index operations
    // ========================================================================

    /// Replace a category's entries behind the consistency guard
    pub async fn rebuild_shard(
        &mut self,
        category: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<CommitOutcome> {
        let now = self.now();
        self.index.rebuild_shard(category, entries, now).await
    }

    /// Remove many entries behind the consistency guard
    ///
    /// Documents are left in place.
    pub async fn remove_entries(&mut self, paths: &[String]) -> Result<BulkRemoval> {
        let now = self.now();
        let canonical = paths
            .iter()
            .map(|p| self.canonical(p))
            .collect::<Result<Vec<_>>>()?;
        self.index.remove_entries(&canonical, now).await
    }

    /// Persist access statistics and any other pending index changes
    pub async fn flush(&mut self) -> Result<usize> {
        self.index.flush().await
    }

    /// Validate every entry against the store
    pub async fn validate(&mut self) -> Result<ValidationReport> {
        let now = self.now();
        self.index.validate(now).await
    }

    /// Report of the most recent validation
    pub fn last_validation(&self) -> Option<&ValidationReport> {
        self.index.last_validation()
    }

    /// Every consistency guard abort recorded in the audit log
    pub async fn audit_log(&self) -> Result<Vec<GuardReport>> {
        self.index.audit_log().await
    }

    /// All entries in priority order
    pub fn ordered_entries(&self) -> Vec<&IndexEntry> {
        self.index.ordered()
    }

    /// Entries eligible for the active working set
    pub fn active_set(&self) -> Vec<&IndexEntry> {
        self.index.active_set(self.config.index.active_set_size)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Apply the aging policy, then flush the index
    pub async fn run_maintenance(&mut self) -> Result<MaintenanceReport> {
        let now = self.now();
        let policy = AgingPolicy::from(&self.config.aging);
        let decisions: Vec<(String, AgingAction)> = self
            .index
            .entries()
            .filter_map(|e| policy.decide(e, now).map(|action| (e.path.clone(), action)))
            .collect();

        let mut report = MaintenanceReport::default();
        for (path, action) in decisions {
            match action {
                AgingAction::Archive => {
                    self.archive_document(&path).await?;
                    report.archived.push(path);
                }
                AgingAction::Decay { from, to } => {
                    self.index.update(&path, |e| e.context_priority = to);
                    debug!(path = %path, %from, %to, "Priority decayed");
                    report.decayed.push((path, from, to));
                }
            }
        }

        report.flushed = self.index.flush().await?;
        info!(
            archived = report.archived.len(),
            decayed = report.decayed.len(),
            flushed = report.flushed,
            "Maintenance complete"
        );
        Ok(report)
    }

    async fn archive_document(&mut self, path: &str) -> Result<()> {
        let key = entry_storage_key(path);
        let target = archive_key(path);
        let local = self.store.local_handle();

        match self.splitter.read(local.as_ref(), &key).await {
            Ok(bytes) => {
                local.write(&target, &bytes).await?;
                self.splitter.delete(local.as_ref(), &key).await?;
            }
            Err(e) if e.is_not_found() => {
                warn!(path, "Archiving entry whose document is missing");
            }
            Err(e) => return Err(e),
        }

        self.index.update(path, |e| {
            e.archived = true;
            e.archive_path = Some(target);
            e.context_priority = ContextPriority::Low;
        });
        self.cache.invalidate(path).await?;
        info!(path, "Archived document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use memvault_core::{StorageLimitError, ValidationError};
    use memvault_storage::MemoryRemote;
    use parking_lot::Mutex;

    async fn vault() -> MemVault {
        let mut vault = MemVault::ephemeral(VaultConfig::for_testing()).await.unwrap();
        vault.register_category("notes", "notes").await.unwrap();
        vault
    }

    fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        let clock: Clock = Arc::new(move || *handle.lock());
        (clock, now)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let mut vault = vault().await;
        let outcome = vault
            .write_document("notes/a.md", "# Alpha\n\nFirst note.\n", WriteOptions::replace())
            .await
            .unwrap();
        assert_eq!(outcome.path, "notes/a.md");
        assert_eq!(outcome.category, "notes");
        assert!(!outcome.split);
        assert!(outcome.backup.is_none());

        let entry = vault.entry("notes/a.md").unwrap();
        assert_eq!(entry.title, "Alpha");
        assert_eq!(entry.description, "First note.");
        assert_eq!(entry.edit_count, 1);

        assert_eq!(
            vault.read_document("notes/a.md").await.unwrap(),
            "# Alpha\n\nFirst note.\n"
        );
        assert_eq!(vault.entry("notes/a.md").unwrap().access_count, 1);
        assert_eq!(vault.cache_tier("notes/a.md"), Some(Tier::Hot));
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected() {
        let mut vault = vault().await;
        for path in ["../x.md", "/etc/passwd", "system/a.md", "other/a.md"] {
            let err = vault
                .write_document(path, "x", WriteOptions::replace())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{}: {:?}", path, err);
        }
        assert!(vault.index().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_file_names_rejected() {
        let mut vault = vault().await;
        vault
            .write_document("notes/a.md", "keep\n", WriteOptions::replace())
            .await
            .unwrap();
        let shard = vault.store().read("entries/notes/index.json").await.unwrap();

        for path in [
            "notes/index.json",
            "notes/memory_index.json",
            "notes/big.part1.md",
            "notes/index.part2.json",
        ] {
            let err = vault
                .write_document(path, "[]", WriteOptions::replace())
                .await
                .unwrap_err();
            assert!(
                matches!(err, Error::Validation(ValidationError::ReservedFileName(_))),
                "{}: {:?}",
                path,
                err
            );
        }

        assert_eq!(vault.store().read("entries/notes/index.json").await.unwrap(), shard);
        assert!(!vault.store().exists("entries/notes/memory_index.json").await.unwrap());
        assert_eq!(vault.index().len(), 1);
    }

    #[tokio::test]
    async fn test_backups_pruned_to_retention() {
        let start = Utc::now();
        let (clock, now) = manual_clock(start);
        let config = VaultConfig::for_testing().with_backup_retention(2);
        let mut vault = MemVault::ephemeral(config).await.unwrap().with_clock(clock);
        vault.register_category("notes", "notes").await.unwrap();

        for version in 1..=5 {
            vault
                .write_document("notes/a.md", &format!("v{}\n", version), WriteOptions::replace())
                .await
                .unwrap();
            *now.lock() += Duration::seconds(1);
        }

        let backups = memvault_storage::list_backups(vault.store(), "entries/notes/a.md")
            .await
            .unwrap();
        assert_eq!(backups.len(), 2);

        vault.rollback("notes/a.md").await.unwrap();
        assert_eq!(vault.read_document("notes/a.md").await.unwrap(), "v4\n");
    }

    #[tokio::test]
    async fn test_merge_write_keeps_existing_sections() {
        let mut vault = vault().await;
        vault
            .write_document("notes/todo.md", "## Home\n- [ ] paint\n## Work\n- [ ] report\n", WriteOptions::replace())
            .await
            .unwrap();
        vault
            .write_document(
                "notes/todo.md",
                "## Work\n- [x] report\n- [ ] email\n",
                WriteOptions::merged(MergeOptions::default()),
            )
            .await
            .unwrap();

        let text = vault.read_document("notes/todo.md").await.unwrap();
        assert!(text.contains("- [ ] paint"));
        assert!(text.contains("- [x] report"));
        assert!(text.contains("- [ ] email"));
    }

    #[tokio::test]
    async fn test_rewrite_takes_backup_and_rollback_restores() {
        let mut vault = vault().await;
        vault
            .write_document("notes/a.md", "v1\n", WriteOptions::replace())
            .await
            .unwrap();
        let outcome = vault
            .write_document("notes/a.md", "v2\n", WriteOptions::replace())
            .await
            .unwrap();
        assert!(outcome.backup.is_some());

        vault.rollback("notes/a.md").await.unwrap();
        assert_eq!(vault.read_document("notes/a.md").await.unwrap(), "v1\n");
    }

    #[tokio::test]
    async fn test_oversized_write_fails_closed_when_splitting_disabled() {
        let mut config = VaultConfig::for_testing();
        config.split.enabled = false;
        let mut vault = MemVault::ephemeral(config).await.unwrap();
        vault.register_category("notes", "notes").await.unwrap();
        vault
            .write_document("notes/a.md", "small\n", WriteOptions::replace())
            .await
            .unwrap();

        let big = "x".repeat(8 * 1024);
        let err = vault
            .write_document("notes/a.md", &big, WriteOptions::replace())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StorageLimit(StorageLimitError::FileTooLarge { .. })
        ));
        assert_eq!(vault.read_document("notes/a.md").await.unwrap(), "small\n");
        assert_eq!(vault.entry("notes/a.md").unwrap().edit_count, 1);
        assert!(vault.store().list("backups").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_write_is_split_and_read_back() {
        let mut vault = vault().await;
        let content: String = (0..40)
            .map(|i| format!("Paragraph {} {}\n\n", i, "words ".repeat(15)))
            .collect();
        let outcome = vault
            .write_document("notes/big.md", &content, WriteOptions::replace())
            .await
            .unwrap();
        assert!(outcome.split);
        assert!(outcome.parts.len() >= 2);

        vault.cache.clear_memory();
        assert_eq!(vault.read_document("notes/big.md").await.unwrap(), content);

        let range = vault.read_range("notes/big.md", 10, 20).await.unwrap();
        assert_eq!(range.bytes, content.as_bytes()[10..30].to_vec());
        assert!(!range.truncated);

        let err = vault
            .read_range("notes/big.md", content.len() as u64, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_entry() {
        let mut vault = vault().await;
        vault
            .write_document("notes/a.md", "x\n", WriteOptions::replace())
            .await
            .unwrap();
        assert!(vault.delete_document("notes/a.md").await.unwrap());
        assert!(vault.entry("notes/a.md").is_none());
        assert!(vault.read_document("notes/a.md").await.unwrap_err().is_not_found());
        assert!(!vault.delete_document("notes/a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_mirror_and_fallback() {
        let remote = Arc::new(MemoryRemote::new());
        let mut vault = vault().await.with_remote(remote.clone());

        let outcome = vault
            .write_document("notes/a.md", "hello\n", WriteOptions::replace().with_message("add a"))
            .await
            .unwrap();
        assert!(outcome.mirror_error.is_none());
        assert_eq!(remote.message("entries/notes/a.md").as_deref(), Some("add a"));

        remote.set_failing(true);
        let outcome = vault
            .write_document("notes/b.md", "local wins\n", WriteOptions::replace())
            .await
            .unwrap();
        assert!(outcome.mirror_error.is_some());
        assert_eq!(vault.read_document("notes/b.md").await.unwrap(), "local wins\n");

        remote.set_failing(false);
        remote.insert("entries/notes/remote.md", "from remote\n");
        assert_eq!(
            vault.read_document("notes/remote.md").await.unwrap(),
            "from remote\n"
        );
    }

    #[tokio::test]
    async fn test_maintenance_archives_and_decays() {
        let start = Utc::now();
        let (clock, now) = manual_clock(start);
        let mut vault = vault().await.with_clock(clock);

        vault
            .write_document("notes/stale.md", "old\n", WriteOptions::replace())
            .await
            .unwrap();
        vault
            .write_document("notes/pinned.md", "---\npinned: true\n---\nkeep\n", WriteOptions::replace())
            .await
            .unwrap();
        vault
            .write_document("notes/read.md", "---\ncontext_priority: high\n---\nread once\n", WriteOptions::replace())
            .await
            .unwrap();
        vault.read_document("notes/read.md").await.unwrap();

        *now.lock() = start + Duration::days(20);
        let report = vault.run_maintenance().await.unwrap();
        assert!(report.archived.is_empty());
        assert_eq!(
            report.decayed,
            vec![
                ("notes/stale.md".to_string(), ContextPriority::Medium, ContextPriority::Low),
                ("notes/read.md".to_string(), ContextPriority::High, ContextPriority::Medium),
            ]
        );

        *now.lock() = start + Duration::days(60);
        let report = vault.run_maintenance().await.unwrap();
        assert_eq!(report.archived, vec!["notes/stale.md"]);

        let entry = vault.entry("notes/stale.md").unwrap();
        assert!(entry.archived);
        assert_eq!(entry.archive_path.as_deref(), Some("archive/notes/stale.md"));
        assert!(!vault.store().exists("entries/notes/stale.md").await.unwrap());
        assert_eq!(vault.read_document("notes/stale.md").await.unwrap(), "old\n");

        let pinned = vault.entry("notes/pinned.md").unwrap();
        assert!(!pinned.archived);
        assert_eq!(pinned.context_priority, ContextPriority::Medium);
    }

    #[tokio::test]
    async fn test_writing_archived_entry_restores_it() {
        let start = Utc::now();
        let (clock, now) = manual_clock(start);
        let mut vault = vault().await.with_clock(clock);
        vault
            .write_document("notes/a.md", "- one\n", WriteOptions::replace())
            .await
            .unwrap();
        *now.lock() = start + Duration::days(90);
        vault.run_maintenance().await.unwrap();
        assert!(vault.entry("notes/a.md").unwrap().archived);

        vault
            .write_document("notes/a.md", "- two\n", WriteOptions::merged(MergeOptions::default()))
            .await
            .unwrap();
        let entry = vault.entry("notes/a.md").unwrap();
        assert!(!entry.archived);
        assert!(entry.archive_path.is_none());
        assert!(!vault.store().exists("archive/notes/a.md").await.unwrap());
        assert_eq!(
            vault.read_document("notes/a.md").await.unwrap(),
            "- one\n- two\n"
        );
    }

    #[tokio::test]
    async fn test_active_set_uses_configured_cap() {
        let mut vault = MemVault::ephemeral(VaultConfig::for_testing().with_active_set_size(2))
            .await
            .unwrap();
        vault.register_category("notes", "notes").await.unwrap();
        for (name, priority) in [("a", "low"), ("b", "high"), ("c", "medium"), ("d", "high")] {
            let text = format!("---\ncontext_priority: {}\n---\n{}\n", priority, name);
            vault
                .write_document(&format!("notes/{}.md", name), &text, WriteOptions::replace())
                .await
                .unwrap();
        }
        let active: Vec<_> = vault.active_set().iter().map(|e| e.path.clone()).collect();
        assert_eq!(active, vec!["notes/b.md", "notes/d.md"]);
    }

    #[tokio::test]
    async fn test_rebuild_and_bulk_removal_are_guarded() {
        let mut vault = vault().await;
        for i in 0..10 {
            vault
                .write_document(&format!("notes/{}.md", i), "x\n", WriteOptions::replace())
                .await
                .unwrap();
        }
        let paths: Vec<String> = (0..5).map(|i| format!("notes/{}.md", i)).collect();
        let bulk = vault.remove_entries(&paths).await.unwrap();
        assert!(bulk.removed.is_empty());
        assert_eq!(vault.audit_log().await.unwrap().len(), 1);

        let outcome = vault.rebuild_shard("notes", Vec::new()).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Aborted(_)));
        assert!(matches!(
            outcome.ensure_committed(),
            Err(Error::ConsistencyAbort { removed: 10, .. })
        ));
        assert_eq!(vault.index().len(), 10);
    }

    #[tokio::test]
    async fn test_reserved_namespace_category_rejected() {
        let mut vault = vault().await;
        let err = vault.register_category("sys", "plugins").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::ReservedNamespace { .. })
        ));
    }
}
