//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Once};

use chrono::{DateTime, Duration, Utc};
use memvault::memvault_engine::Clock;
use memvault::{MemVault, VaultConfig, WriteOptions, WriteOutcome};
use parking_lot::Mutex;
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

// ============================================================================
// ManualClock
// ============================================================================

/// Clock the test advances by hand.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(Utc::now())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn clock(&self) -> Clock {
        let now = Arc::clone(&self.now);
        Arc::new(move || *now.lock())
    }
}

// ============================================================================
// TestVault - on-disk vault in a temp dir
// ============================================================================

/// On-disk vault that lives as long as its temp dir.
pub struct TestVault {
    pub vault: MemVault,
    pub dir: TempDir,
    pub clock: ManualClock,
}

impl TestVault {
    /// Vault with test thresholds and a `notes` category.
    pub async fn new() -> Self {
        Self::with_config(VaultConfig::for_testing()).await
    }

    /// Vault with `config` and a `notes` category.
    pub async fn with_config(config: VaultConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let clock = ManualClock::new();
        let mut vault = MemVault::open_with_config(dir.path(), config)
            .await
            .expect("Failed to open test vault")
            .with_clock(clock.clock());
        vault
            .register_category("notes", "notes")
            .await
            .expect("Failed to register category");
        TestVault { vault, dir, clock }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Drop the vault and open the same directory again.
    pub async fn reopen(self) -> Self {
        let TestVault { vault, dir, clock } = self;
        drop(vault);
        let vault = MemVault::open(dir.path())
            .await
            .expect("Failed to reopen test vault")
            .with_clock(clock.clock());
        TestVault { vault, dir, clock }
    }

    /// Replace a document, panicking on error.
    pub async fn put(&mut self, path: &str, text: &str) -> WriteOutcome {
        self.vault
            .write_document(path, text, WriteOptions::replace())
            .await
            .unwrap_or_else(|e| panic!("write {} failed: {}", path, e))
    }
}

/// Lines of filler text of roughly `bytes` bytes, broken into paragraphs.
pub fn paragraphs(bytes: usize) -> String {
    let mut text = String::with_capacity(bytes + 128);
    let mut i = 0;
    while text.len() < bytes {
        text.push_str(&format!("## Section {}\n", i));
        text.push_str(&"lorem ipsum dolor sit amet ".repeat(12));
        text.push_str("\n\n");
        i += 1;
    }
    text.truncate(bytes);
    text
}
