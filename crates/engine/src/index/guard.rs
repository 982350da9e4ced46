//! Consistency guard for index rewrites
//!
//! Before a recomputed shard is committed, its path set is compared to the
//! persisted one. A rewrite that removes or churns too large a share of the
//! previous entries is refused and recorded in the audit log.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use memvault_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use memvault_storage::BlobStore;

use crate::config::GuardConfig;

/// Record of a refused rewrite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardReport {
    /// Shard category
    pub category: String,
    /// Paths the rewrite would have added
    pub added: Vec<String>,
    /// Paths the rewrite would have removed
    pub removed: Vec<String>,
    /// Entry count of the persisted shard
    pub previous: usize,
    /// When the rewrite was refused
    pub at: DateTime<Utc>,
}

impl GuardReport {
    /// The report as an error
    pub fn into_error(self) -> Error {
        Error::ConsistencyAbort {
            category: self.category,
            added: self.added.len(),
            removed: self.removed.len(),
            previous: self.previous,
        }
    }
}

/// Result of a guarded commit
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum CommitOutcome {
    /// The rewrite was persisted
    Committed {
        /// Paths added
        added: usize,
        /// Paths removed
        removed: usize,
        /// Entries in the shard afterwards
        entries: usize,
    },
    /// The guard refused the rewrite; the shard is unchanged
    Aborted(GuardReport),
}

impl CommitOutcome {
    /// Whether the rewrite was persisted
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Turn an abort into [`Error::ConsistencyAbort`]
    pub fn ensure_committed(self) -> Result<()> {
        match self {
            CommitOutcome::Committed { .. } => Ok(()),
            CommitOutcome::Aborted(report) => Err(report.into_error()),
        }
    }
}

/// Removal and churn thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyGuard {
    max_removed_ratio: f64,
    max_churn_ratio: f64,
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        ConsistencyGuard::from(&GuardConfig::default())
    }
}

impl From<&GuardConfig> for ConsistencyGuard {
    fn from(config: &GuardConfig) -> Self {
        ConsistencyGuard {
            max_removed_ratio: config.max_removed_ratio,
            max_churn_ratio: config.max_churn_ratio,
        }
    }
}

impl ConsistencyGuard {
    /// Compare path sets; `Some` means the rewrite must be refused
    ///
    /// An empty previous set never trips the guard.
    pub fn check(
        &self,
        category: &str,
        previous: &BTreeSet<String>,
        next: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Option<GuardReport> {
        if previous.is_empty() {
            return None;
        }
        let removed: Vec<String> = previous.difference(next).cloned().collect();
        let added: Vec<String> = next.difference(previous).cloned().collect();

        let base = previous.len() as f64;
        let removed_share = removed.len() as f64 / base;
        let churn_share = (removed.len() + added.len()) as f64 / base;
        if removed_share > self.max_removed_ratio || churn_share > self.max_churn_ratio {
            return Some(GuardReport {
                category: category.to_string(),
                added,
                removed,
                previous: previous.len(),
                at: now,
            });
        }
        None
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    event: &'static str,
    #[serde(flatten)]
    report: &'a GuardReport,
}

/// Append a refused rewrite to the JSON-lines audit log at `key`
pub async fn append_audit(store: &dyn BlobStore, key: &str, report: &GuardReport) -> Result<()> {
    let mut log = match store.read(key).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e),
    };
    if !log.is_empty() && !log.ends_with(b"\n") {
        log.push(b'\n');
    }
    serde_json::to_writer(
        &mut log,
        &AuditLine {
            event: "consistency-abort",
            report,
        },
    )?;
    log.push(b'\n');
    store.write(key, &log).await?;

    warn!(
        category = %report.category,
        added = report.added.len(),
        removed = report.removed.len(),
        previous = report.previous,
        "Consistency guard aborted index rewrite"
    );
    Ok(())
}

/// Parse the audit log back into reports
pub fn parse_audit(bytes: &[u8]) -> Result<Vec<GuardReport>> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<GuardReport>(line).map_err(Error::from))
        .collect()
}
