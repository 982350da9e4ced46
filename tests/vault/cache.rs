//! Tiered content cache as seen through the vault

use crate::common::*;
use memvault::{Tier, VaultConfig};

async fn tiny_cache() -> TestVault {
    TestVault::with_config(VaultConfig::for_testing().with_cache(1, 1)).await
}

#[tokio::test]
async fn writes_cascade_through_the_tiers() {
    let mut tv = tiny_cache().await;
    tv.put("notes/a.md", "alpha\n").await;
    tv.put("notes/b.md", "beta\n").await;
    tv.put("notes/c.md", "gamma\n").await;

    assert_eq!(tv.vault.cache_tier("notes/c.md"), Some(Tier::Hot));
    assert_eq!(tv.vault.cache_tier("notes/b.md"), Some(Tier::Cold));
    assert_eq!(tv.vault.cache_tier("notes/a.md"), None);
    assert_eq!(
        std::fs::read_to_string(tv.path().join("cache/notes/a.md")).unwrap(),
        "alpha\n"
    );
}

#[tokio::test]
async fn archived_value_is_promoted_on_read() {
    let mut tv = tiny_cache().await;
    tv.put("notes/a.md", "alpha\n").await;
    tv.put("notes/b.md", "beta\n").await;
    tv.put("notes/c.md", "gamma\n").await;

    assert_eq!(tv.vault.read_document("notes/a.md").await.unwrap(), "alpha\n");
    assert_eq!(tv.vault.cache_tier("notes/a.md"), Some(Tier::Hot));
    assert_eq!(tv.vault.cache_tier("notes/c.md"), Some(Tier::Cold));
    assert!(!tv.path().join("cache/notes/a.md").exists());
    assert!(tv.path().join("cache/notes/b.md").is_file());
}

#[tokio::test]
async fn rewrite_replaces_cached_value() {
    let mut tv = tiny_cache().await;
    tv.put("notes/a.md", "old\n").await;
    tv.put("notes/b.md", "other\n").await;
    tv.put("notes/a.md", "new\n").await;

    assert_eq!(tv.vault.cache_tier("notes/a.md"), Some(Tier::Hot));
    assert_eq!(tv.vault.read_document("notes/a.md").await.unwrap(), "new\n");
}

#[tokio::test]
async fn deleted_document_leaves_no_cached_copy() {
    let mut tv = tiny_cache().await;
    tv.put("notes/a.md", "alpha\n").await;
    tv.put("notes/b.md", "beta\n").await;
    tv.put("notes/c.md", "gamma\n").await;

    assert!(tv.vault.delete_document("notes/a.md").await.unwrap());
    assert!(!tv.path().join("cache/notes/a.md").exists());
    assert!(tv.vault.read_document("notes/a.md").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn demoted_values_never_overwrite_archived_documents() {
    let mut tv = tiny_cache().await;
    tv.vault.register_category("scratch", "cache").await.unwrap();
    tv.put("cache/notes/a.md", "archived\n").await;
    tv.clock.advance(chrono::Duration::days(60));
    let report = tv.vault.run_maintenance().await.unwrap();
    assert_eq!(report.archived, vec!["cache/notes/a.md"]);

    tv.put("notes/a.md", "alpha\n").await;
    tv.put("notes/b.md", "beta\n").await;
    tv.put("notes/c.md", "gamma\n").await;
    assert_eq!(tv.vault.cache_tier("notes/a.md"), None);

    assert_eq!(
        std::fs::read_to_string(tv.path().join("archive/cache/notes/a.md")).unwrap(),
        "archived\n"
    );
    assert_eq!(
        std::fs::read_to_string(tv.path().join("cache/notes/a.md")).unwrap(),
        "alpha\n"
    );
    assert_eq!(tv.vault.read_document("cache/notes/a.md").await.unwrap(), "archived\n");
    assert_eq!(tv.vault.read_document("notes/a.md").await.unwrap(), "alpha\n");
}
