//! Vault directory structure
//!
//! A vault is a portable directory containing all state:
//!
//! ```text
//! vault/
//! ├── memvault.toml    # Configuration
//! ├── entries/         # Root index, shards, documents, split manifests
//! ├── archive/         # Aged-out documents
//! ├── cache/           # Values demoted out of the cold cache tier
//! ├── backups/         # Snapshots taken before rewrites
//! └── audit.log        # Consistency guard audit trail
//! ```
//!
//! Blob store keys are relative to the vault root; the `*_KEY`/`*_ROOT`
//! constants name the same locations in key space.

use std::path::{Path, PathBuf};

use memvault_core::path::join;
use memvault_core::{ENTRIES_ROOT, ROOT_INDEX_FILE};
use memvault_storage::BACKUP_ROOT;

use crate::config::CONFIG_FILE_NAME;

/// Key prefix of archived documents
pub const ARCHIVE_ROOT: &str = "archive";

/// Key prefix of the cache's archive tier
pub const CACHE_ARCHIVE_ROOT: &str = "cache";

/// Key of the audit log
pub const AUDIT_LOG_KEY: &str = "audit.log";

/// Key of the root index
pub fn root_index_key() -> String {
    join(ENTRIES_ROOT, ROOT_INDEX_FILE)
}

/// Key an archived document is moved to
///
/// `notes/a.md` is archived at `archive/notes/a.md`.
pub fn archive_key(entry_path: &str) -> String {
    join(ARCHIVE_ROOT, entry_path)
}

/// Vault directory paths
#[derive(Debug, Clone)]
pub struct VaultPaths {
    root: PathBuf,
}

impl VaultPaths {
    /// Create paths from root directory
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        VaultPaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root vault directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the config file path
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Get the entries directory
    pub fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_ROOT)
    }

    /// Get the archive directory
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_ROOT)
    }

    /// Get the cache archive directory
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_ARCHIVE_ROOT)
    }

    /// Get the backups directory
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUP_ROOT)
    }

    /// Get the audit log path
    pub fn audit_log(&self) -> PathBuf {
        self.root.join(AUDIT_LOG_KEY)
    }

    /// Check if a vault exists at this path
    ///
    /// A vault exists if its config file is present.
    pub fn exists(&self) -> bool {
        self.config_file().exists()
    }

    /// Create the full directory structure
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.entries_dir())?;
        std::fs::create_dir_all(self.archive_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_layout() {
        let paths = VaultPaths::from_root("/tmp/vault");
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/vault/memvault.toml"));
        assert_eq!(paths.entries_dir(), PathBuf::from("/tmp/vault/entries"));
        assert_eq!(paths.audit_log(), PathBuf::from("/tmp/vault/audit.log"));
    }

    #[test]
    fn test_create_directories() {
        let dir = TempDir::new().unwrap();
        let paths = VaultPaths::from_root(dir.path().join("vault"));
        assert!(!paths.exists());
        paths.create_directories().unwrap();
        assert!(paths.entries_dir().is_dir());
        assert!(paths.archive_dir().is_dir());
        assert!(paths.cache_dir().is_dir());
        assert!(paths.backups_dir().is_dir());
    }

    #[test]
    fn test_keys() {
        assert_eq!(root_index_key(), "entries/index.json");
        assert_eq!(archive_key("notes/a.md"), "archive/notes/a.md");
    }

    #[test]
    fn test_cache_archive_outside_archive_root() {
        let cached = join(CACHE_ARCHIVE_ROOT, "cache/a.md");
        assert_eq!(cached, "cache/cache/a.md");
        assert_ne!(cached, archive_key("cache/a.md"));
        assert!(!memvault_core::path::in_namespace(CACHE_ARCHIVE_ROOT, ARCHIVE_ROOT));
        assert!(!memvault_core::path::in_namespace(CACHE_ARCHIVE_ROOT, ENTRIES_ROOT));
    }
}
