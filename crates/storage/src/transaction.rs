//! Scoped write transactions and backups
//!
//! Before a document is rewritten its current content is snapshotted to
//! `backups/<key>.<millis>.bak`. The transaction then either commits (the
//! backup stays for manual rollback) or restores the snapshot.
//!
//! Backups are only read back by [`restore_latest`]. [`prune_backups`]
//! keeps the newest few per document and deletes the rest.

use chrono::{DateTime, Utc};
use memvault_core::path::{file_name, join, parent_dir};
use memvault_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::split::ContentSplitter;
use crate::store::BlobStore;

/// Directory holding backups, relative to the data directory
pub const BACKUP_ROOT: &str = "backups";

const BACKUP_SUFFIX: &str = ".bak";

/// Backup key for `key` taken at `at`
///
/// Millisecond timestamps are zero-padded so keys sort chronologically.
pub fn backup_key(key: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}.{:013}{}",
        join(BACKUP_ROOT, key),
        at.timestamp_millis().max(0),
        BACKUP_SUFFIX
    )
}

/// All backups of `key`, oldest first
pub async fn list_backups(store: &dyn BlobStore, key: &str) -> Result<Vec<String>> {
    let target = join(BACKUP_ROOT, key);
    let dir = parent_dir(&target);
    let prefix = format!("{}.", file_name(&target));

    let mut backups: Vec<String> = store
        .list(dir)
        .await?
        .into_iter()
        .filter(|k| parent_dir(k) == dir)
        .filter(|k| {
            let name = file_name(k);
            name.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
                .map_or(false, |stamp| !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect();
    backups.sort();
    Ok(backups)
}

/// Newest backup of `key`, if any
pub async fn latest_backup(store: &dyn BlobStore, key: &str) -> Result<Option<String>> {
    Ok(list_backups(store, key).await?.pop())
}

/// Delete all but the newest `keep` backups of `key`
///
/// Returns the deleted backup keys, oldest first.
pub async fn prune_backups(store: &dyn BlobStore, key: &str, keep: usize) -> Result<Vec<String>> {
    let mut backups = list_backups(store, key).await?;
    let excess = backups.len().saturating_sub(keep);
    backups.truncate(excess);
    for backup in &backups {
        store.delete(backup).await?;
    }
    if !backups.is_empty() {
        debug!(key, pruned = backups.len(), keep, "Pruned backups");
    }
    Ok(backups)
}

/// Restore the newest backup of `key` through the splitter
///
/// Returns the backup key that was restored.
pub async fn restore_latest(
    store: &dyn BlobStore,
    splitter: &ContentSplitter,
    key: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let backup = latest_backup(store, key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no backup of '{}'", key)))?;
    let content = store.read(&backup).await?;
    splitter.write(store, key, &content, now).await?;
    info!(key, backup = %backup, "Restored document from backup");
    Ok(backup)
}

/// Snapshot of a document taken before rewriting it
#[derive(Debug)]
#[must_use = "a transaction must be committed or restored"]
pub struct WriteTransaction {
    key: String,
    prior: Option<Vec<u8>>,
    backup: Option<String>,
}

impl WriteTransaction {
    /// Snapshot the current content of `key` and write a backup
    ///
    /// A document that does not exist yet has no snapshot and no backup.
    pub async fn begin(
        store: &dyn BlobStore,
        splitter: &ContentSplitter,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let prior = match splitter.read(store, key).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let backup = match &prior {
            Some(bytes) => {
                let backup = backup_key(key, now);
                store.write(&backup, bytes).await?;
                debug!(key, backup = %backup, "Took backup");
                Some(backup)
            }
            None => None,
        };

        Ok(WriteTransaction {
            key: key.to_string(),
            prior,
            backup,
        })
    }

    /// Document key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Content before the write, if the document existed
    pub fn prior(&self) -> Option<&[u8]> {
        self.prior.as_deref()
    }

    /// Backup taken for this write
    pub fn backup(&self) -> Option<&str> {
        self.backup.as_deref()
    }

    /// Keep the new content; returns the backup key
    pub fn commit(self) -> Option<String> {
        self.backup
    }

    /// Put the snapshot back (or remove a document that did not exist)
    pub async fn restore(
        self,
        store: &dyn BlobStore,
        splitter: &ContentSplitter,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match &self.prior {
            Some(bytes) => {
                splitter.write(store, &self.key, bytes, now).await?;
            }
            None => {
                splitter.delete(store, &self.key).await?;
            }
        }
        warn!(key = %self.key, "Write rolled back to snapshot");
        Ok(())
    }
}
