//! Vault configuration via `memvault.toml`
//!
//! On first open a commented default `memvault.toml` is created in the data
//! directory. To change settings, edit the file and reopen the vault.
//! Missing keys take their defaults; values are validated eagerly on load.

use chrono::Duration;
use memvault_core::{Error, Result, StorageLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the vault data directory.
pub const CONFIG_FILE_NAME: &str = "memvault.toml";

/// `[index]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Serialized shard size above which the shard is written as parts
    pub shard_max_bytes: u64,
    /// Cap on the active working set projection
    pub active_set_size: usize,
    /// Namespaces no entry may live under
    pub reserved_namespaces: Vec<String>,
    /// Drop unpinned entries whose document is missing during validation
    pub auto_clean: bool,
    /// Run validation when the vault is opened
    pub validate_on_open: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            shard_max_bytes: 64 * 1024,
            active_set_size: 20,
            reserved_namespaces: vec!["system".to_string(), "plugins".to_string()],
            auto_clean: false,
            validate_on_open: true,
        }
    }
}

/// `[split]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Split oversized documents into parts
    pub enabled: bool,
    /// Split threshold and nominal part size
    pub max_part_bytes: u64,
    /// Split text at block boundaries before falling back to byte offsets
    pub semantic: bool,
    /// Maximum parts per document
    pub max_parts: usize,
    /// Maximum single-file size when splitting is disabled
    pub max_file_bytes: u64,
    /// Quota on the total bytes of one directory
    pub max_dir_bytes: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        let limits = StorageLimits::default();
        SplitConfig {
            enabled: limits.split_enabled,
            max_part_bytes: limits.max_part_bytes,
            semantic: true,
            max_parts: limits.max_parts,
            max_file_bytes: limits.max_file_bytes,
            max_dir_bytes: limits.max_dir_bytes,
        }
    }
}

impl SplitConfig {
    /// Limits enforced by the content splitter
    pub fn limits(&self) -> StorageLimits {
        StorageLimits {
            split_enabled: self.enabled,
            max_part_bytes: self.max_part_bytes,
            max_parts: self.max_parts,
            max_file_bytes: self.max_file_bytes,
            max_dir_bytes: self.max_dir_bytes,
        }
    }
}

/// `[cache]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hot tier capacity (entries)
    pub hot_capacity: usize,
    /// Cold tier capacity (entries)
    pub cold_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            hot_capacity: 64,
            cold_capacity: 256,
        }
    }
}

/// `[guard]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Abort when removed paths exceed this share of the previous count
    pub max_removed_ratio: f64,
    /// Abort when added plus removed paths exceed this share
    pub max_churn_ratio: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            max_removed_ratio: 0.30,
            max_churn_ratio: 0.50,
        }
    }
}

/// `[aging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    /// Archive never-read entries idle longer than this
    pub archive_after_days: u32,
    /// Step priority down for entries idle longer than this
    pub decay_after_days: u32,
    /// Entries read fewer times than this are eligible for decay
    pub low_access_threshold: u64,
    /// Entries read or edited more often than this never decay
    pub frequent_access_threshold: u64,
    /// Backups kept per document; older ones are deleted after each write
    pub backup_retention: usize,
}

impl Default for AgingConfig {
    fn default() -> Self {
        AgingConfig {
            archive_after_days: 56,
            decay_after_days: 14,
            low_access_threshold: 3,
            frequent_access_threshold: 10,
            backup_retention: 10,
        }
    }
}

impl AgingConfig {
    /// Idle time after which an unread entry is archived
    pub fn archive_after(&self) -> Duration {
        Duration::days(i64::from(self.archive_after_days))
    }

    /// Idle time after which a rarely read entry decays
    pub fn decay_after(&self) -> Duration {
        Duration::days(i64::from(self.decay_after_days))
    }
}

/// Vault configuration loaded from `memvault.toml`.
///
/// # Example
///
/// ```toml
/// [index]
/// shard_max_bytes = 65536
///
/// [guard]
/// max_removed_ratio = 0.30
/// max_churn_ratio = 0.50
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Index store settings
    pub index: IndexConfig,
    /// Content splitter settings
    pub split: SplitConfig,
    /// Tiered cache settings
    pub cache: CacheConfig,
    /// Consistency guard thresholds
    pub guard: GuardConfig,
    /// Aging policy thresholds
    pub aging: AgingConfig,
}

impl VaultConfig {
    /// Small thresholds for tests
    pub fn for_testing() -> Self {
        VaultConfig {
            index: IndexConfig {
                shard_max_bytes: 4 * 1024,
                active_set_size: 5,
                validate_on_open: false,
                ..IndexConfig::default()
            },
            split: SplitConfig {
                max_part_bytes: 1024,
                max_parts: 16,
                max_file_bytes: 4 * 1024,
                max_dir_bytes: 1024 * 1024,
                ..SplitConfig::default()
            },
            cache: CacheConfig {
                hot_capacity: 4,
                cold_capacity: 4,
            },
            ..VaultConfig::default()
        }
    }

    /// Set the shard part threshold
    pub fn with_shard_max_bytes(mut self, bytes: u64) -> Self {
        self.index.shard_max_bytes = bytes;
        self
    }

    /// Set the active set cap
    pub fn with_active_set_size(mut self, size: usize) -> Self {
        self.index.active_set_size = size;
        self
    }

    /// Enable or disable auto-clean of missing entries
    pub fn with_auto_clean(mut self, enabled: bool) -> Self {
        self.index.auto_clean = enabled;
        self
    }

    /// Enable or disable validation on open
    pub fn with_validate_on_open(mut self, enabled: bool) -> Self {
        self.index.validate_on_open = enabled;
        self
    }

    /// Replace the reserved namespaces
    pub fn with_reserved_namespaces<S: Into<String>>(
        mut self,
        namespaces: impl IntoIterator<Item = S>,
    ) -> Self {
        self.index.reserved_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Set the split threshold and toggle semantic splitting
    pub fn with_split(mut self, max_part_bytes: u64, semantic: bool) -> Self {
        self.split.max_part_bytes = max_part_bytes;
        self.split.semantic = semantic;
        self
    }

    /// Replace all split limits
    pub fn with_limits(mut self, limits: StorageLimits) -> Self {
        self.split.enabled = limits.split_enabled;
        self.split.max_part_bytes = limits.max_part_bytes;
        self.split.max_parts = limits.max_parts;
        self.split.max_file_bytes = limits.max_file_bytes;
        self.split.max_dir_bytes = limits.max_dir_bytes;
        self
    }

    /// Set cache tier capacities
    pub fn with_cache(mut self, hot: usize, cold: usize) -> Self {
        self.cache.hot_capacity = hot;
        self.cache.cold_capacity = cold;
        self
    }

    /// Set consistency guard ratios
    pub fn with_guard(mut self, max_removed_ratio: f64, max_churn_ratio: f64) -> Self {
        self.guard.max_removed_ratio = max_removed_ratio;
        self.guard.max_churn_ratio = max_churn_ratio;
        self
    }

    /// Set aging thresholds in days
    pub fn with_aging(mut self, archive_after_days: u32, decay_after_days: u32) -> Self {
        self.aging.archive_after_days = archive_after_days;
        self.aging.decay_after_days = decay_after_days;
        self
    }

    /// Set how many backups are kept per document
    pub fn with_backup_retention(mut self, keep: usize) -> Self {
        self.aging.backup_retention = keep;
        self
    }

    /// Check every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        fn bad(key: &str, reason: &str) -> Result<()> {
            Err(Error::Config(format!("{}: {}", key, reason)))
        }

        if self.index.shard_max_bytes == 0 {
            return bad("index.shard_max_bytes", "must be greater than 0");
        }
        if let Some(ns) = self
            .index
            .reserved_namespaces
            .iter()
            .find(|ns| ns.trim().trim_matches('/').is_empty())
        {
            return bad(
                "index.reserved_namespaces",
                &format!("invalid namespace '{}'", ns),
            );
        }
        if self.split.max_part_bytes == 0 {
            return bad("split.max_part_bytes", "must be greater than 0");
        }
        if self.split.max_parts == 0 {
            return bad("split.max_parts", "must be at least 1");
        }
        if self.cache.hot_capacity == 0 || self.cache.cold_capacity == 0 {
            return bad("cache", "tier capacities must be at least 1");
        }
        for (key, ratio) in [
            ("guard.max_removed_ratio", self.guard.max_removed_ratio),
            ("guard.max_churn_ratio", self.guard.max_churn_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return bad(key, "must be in (0, 1]");
            }
        }
        if self.aging.decay_after_days == 0 || self.aging.archive_after_days == 0 {
            return bad("aging", "thresholds must be at least one day");
        }
        if self.aging.backup_retention == 0 {
            return bad("aging.backup_retention", "must be at least 1");
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# MemVault configuration

[index]
# Shard files larger than this (bytes) are written as index.partN.json parts
shard_max_bytes = 65536
# Number of entries eligible for the active working set
active_set_size = 20
# Namespaces no entry may live under
reserved_namespaces = ["system", "plugins"]
# Remove unpinned entries whose document is missing when validating
auto_clean = false
# Validate every entry when the vault is opened
validate_on_open = true

[split]
# Split documents larger than max_part_bytes into numbered parts
enabled = true
max_part_bytes = 524288
# Split text at paragraph breaks and block markers before byte offsets
semantic = true
max_parts = 64
# Largest single file accepted when splitting is disabled
max_file_bytes = 1048576
# Quota on the total size of one directory
max_dir_bytes = 268435456

[cache]
hot_capacity = 64
cold_capacity = 256

[guard]
# Abort an index rewrite removing more than this share of entries
max_removed_ratio = 0.30
# Abort an index rewrite whose added + removed exceeds this share
max_churn_ratio = 0.50

[aging]
# Archive entries never read and idle longer than this
archive_after_days = 56
# Step priority down for entries idle longer than this...
decay_after_days = 14
# ...and read fewer times than this
low_access_threshold = 3
# Entries read or edited more often than this never decay
frequent_access_threshold = 10
# Backups kept per document, newest first
backup_retention = 10
"#
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: VaultConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
