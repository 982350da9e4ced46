//! Blob stores
//!
//! Everything MemVault persists goes through [`BlobStore`]: documents,
//! split parts, shard files, manifests, backups and the archive. Keys are
//! `/`-separated paths relative to the data directory.
//!
//! - [`LocalStore`]: files under a root directory, atomic per-file writes
//! - [`MemoryStore`]: in-process map for tests and ephemeral vaults

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use memvault_core::{Error, Result};
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

/// Byte-oriented key/value persistence
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob; `Error::NotFound` if absent
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Replace a blob atomically, creating parent directories
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Whether a blob exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete a blob; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Move a blob to a new key
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Size of a blob in bytes, if it exists
    async fn size(&self, key: &str) -> Result<Option<u64>>;

    /// All keys below `prefix` (recursive), sorted
    ///
    /// An empty prefix lists the whole store.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read a blob as UTF-8 text
    async fn read_string(&self, key: &str) -> Result<String> {
        let bytes = self.read(key).await?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Serialization(format!("'{}' is not UTF-8: {}", key, e)))
    }
}

fn not_found(key: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound(key.to_string())
    } else {
        Error::Io(e)
    }
}

// ============================================================================
// LocalStore
// ============================================================================

/// Blob store backed by a directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.path_of(key)).await.map_err(|e| not_found(key, e))
    }

    /// Write-fsync-rename, then fsync the parent directory
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(key);
        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => self.root.clone(),
        };
        fs::create_dir_all(&parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(
            ".{}.{}{}",
            file_name,
            uuid::Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            let dir = fs::File::open(&parent).await?;
            dir.sync_all().await?;
        }

        debug!(key, bytes = bytes.len(), "Wrote blob");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_of(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_of(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let dest = self.path_of(to);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.path_of(from), &dest)
            .await
            .map_err(|e| not_found(from, e))
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.path_of(key)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.path_of(prefix)];

        while let Some(dir) = pending.pop() {
            match fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.key_of(&path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

fn under_prefix(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    prefix.is_empty()
        || key == prefix
        || (key.len() > prefix.len()
            && key.starts_with(prefix)
            && key.as_bytes()[prefix.len()] == b'/')
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.lock().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.lock().remove(key).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut blobs = self.blobs.lock();
        let bytes = blobs
            .remove(from)
            .ok_or_else(|| Error::NotFound(from.to_string()))?;
        blobs.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.blobs.lock().get(key).map(|b| b.len() as u64))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .lock()
            .keys()
            .filter(|k| under_prefix(k, prefix))
            .cloned()
            .collect())
    }
}
