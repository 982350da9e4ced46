//! Optional remote mirror
//!
//! Local storage is authoritative. Reads fall back to the remote only when
//! the local blob is missing; writes land locally first and are then pushed
//! to the remote. A remote failure is reported to the caller and never rolls
//! back the local write.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use memvault_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::store::BlobStore;

/// Remote file store collaborator
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Content at `path`, or `None` if absent
    async fn read(&self, path: &str) -> Result<Option<String>>;

    /// Create or replace `path`, with a change message
    async fn write(&self, path: &str, content: &str, message: &str) -> Result<()>;

    /// Whether `path` exists remotely
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Local store plus an optional remote mirror
#[derive(Clone)]
pub struct MirroredStore {
    local: Arc<dyn BlobStore>,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl MirroredStore {
    /// Local-only store
    pub fn new(local: Arc<dyn BlobStore>) -> Self {
        MirroredStore {
            local,
            remote: None,
        }
    }

    /// Attach a remote mirror
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The authoritative local store
    pub fn local(&self) -> &dyn BlobStore {
        self.local.as_ref()
    }

    /// Shared handle to the local store
    pub fn local_handle(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.local)
    }

    /// Whether a remote mirror is attached
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Fetch `key` from the remote, if one is attached
    pub async fn fetch_remote(&self, key: &str) -> Result<Option<String>> {
        match &self.remote {
            Some(remote) => {
                let content = remote.read(key).await?;
                if content.is_some() {
                    debug!(key, "Served from remote mirror");
                }
                Ok(content)
            }
            None => Ok(None),
        }
    }

    /// Read locally, falling back to the remote when missing
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        match self.local.read(key).await {
            Err(e) if e.is_not_found() => match self.fetch_remote(key).await? {
                Some(content) => Ok(content.into_bytes()),
                None => Err(e),
            },
            other => other,
        }
    }

    /// Push content to the remote
    ///
    /// Returns the remote failure, if any, as a message. Local state is not
    /// touched.
    pub async fn mirror(&self, key: &str, content: &[u8], message: &str) -> Option<String> {
        let remote = self.remote.as_ref()?;
        let text = String::from_utf8_lossy(content);
        match remote.write(key, &text, message).await {
            Ok(()) => None,
            Err(e) => {
                warn!(key, error = %e, "Remote mirror write failed");
                Some(e.to_string())
            }
        }
    }

    /// Write locally, then mirror
    ///
    /// A local failure is an error; a remote failure is returned as
    /// `Ok(Some(message))`.
    pub async fn write(&self, key: &str, content: &[u8], message: &str) -> Result<Option<String>> {
        self.local.write(key, content).await?;
        Ok(self.mirror(key, content, message).await)
    }
}

/// In-memory remote for tests, with switchable failure
#[derive(Debug, Default)]
pub struct MemoryRemote {
    files: Mutex<BTreeMap<String, (String, String)>>,
    failing: AtomicBool,
}

impl MemoryRemote {
    /// Empty remote
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a file directly
    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(path.to_string(), (content.to_string(), String::new()));
    }

    /// Commit message of the last write to `path`
    pub fn message(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).map(|(_, m)| m.clone())
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Remote("remote unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn read(&self, path: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.files.lock().get(path).map(|(c, _)| c.clone()))
    }

    async fn write(&self, path: &str, content: &str, message: &str) -> Result<()> {
        self.check()?;
        self.files
            .lock()
            .insert(path.to_string(), (content.to_string(), message.to_string()));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.check()?;
        Ok(self.files.lock().contains_key(path))
    }
}
