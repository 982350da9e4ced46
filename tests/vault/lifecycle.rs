//! Opening, reopening and persistence

use crate::common::*;
use memvault::memvault_engine::CONFIG_FILE_NAME;
use memvault::{MemVault, VaultConfig};

#[tokio::test]
async fn open_creates_layout_and_config() {
    let tv = TestVault::new().await;
    assert!(tv.path().join(CONFIG_FILE_NAME).is_file());
    assert!(tv.path().join("entries").is_dir());
    assert!(tv.path().join("cache").is_dir());
    assert!(tv.path().join("entries/index.json").is_file());
    assert!(tv.path().join("entries/notes/index.json").is_file());

    let paths = tv.vault.paths().expect("on-disk vault has paths");
    assert_eq!(paths.root(), tv.path());
}

#[tokio::test]
async fn reopen_loads_written_config() {
    let config = VaultConfig::for_testing().with_active_set_size(3);
    let tv = TestVault::with_config(config.clone()).await;
    let tv = tv.reopen().await;
    assert_eq!(tv.vault.config(), &config);
}

#[tokio::test]
async fn documents_and_entries_survive_reopen() {
    let mut tv = TestVault::new().await;
    tv.put("notes/alpha.md", "# Alpha\n\nFirst note.\n").await;
    tv.put("notes/beta.md", "---\ntags: [x]\n---\n# Beta\n").await;

    let mut tv = tv.reopen().await;
    assert_eq!(tv.vault.index().len(), 2);
    let alpha = tv.vault.entry("notes/alpha.md").unwrap();
    assert_eq!(alpha.title, "Alpha");
    assert_eq!(alpha.description, "First note.");
    assert!(tv.vault.entry("notes/beta.md").unwrap().tags.contains("x"));

    assert_eq!(
        tv.vault.read_document("notes/alpha.md").await.unwrap(),
        "# Alpha\n\nFirst note.\n"
    );
}

#[tokio::test]
async fn access_statistics_persist_after_flush() {
    let mut tv = TestVault::new().await;
    tv.put("notes/a.md", "a\n").await;
    tv.vault.read_document("notes/a.md").await.unwrap();
    tv.vault.read_document("notes/a.md").await.unwrap();
    assert_eq!(tv.vault.flush().await.unwrap(), 1);

    let tv = tv.reopen().await;
    let entry = tv.vault.entry("notes/a.md").unwrap();
    assert_eq!(entry.access_count, 2);
    assert_eq!(entry.last_accessed, Some(tv.clock.now()));
}

#[tokio::test]
async fn unflushed_touches_are_not_persisted() {
    let mut tv = TestVault::new().await;
    tv.put("notes/a.md", "a\n").await;
    tv.vault.read_document("notes/a.md").await.unwrap();

    let tv = tv.reopen().await;
    assert_eq!(tv.vault.entry("notes/a.md").unwrap().access_count, 0);
}

#[tokio::test]
async fn registering_twice_is_idempotent() {
    let tv = TestVault::new().await;
    let mut tv = tv.reopen().await;
    tv.vault.register_category("notes", "notes").await.unwrap();
    assert_eq!(tv.vault.index().categories().collect::<Vec<_>>(), vec!["notes"]);
}

#[tokio::test]
async fn ephemeral_vault_touches_nothing_on_disk() {
    let mut vault = MemVault::ephemeral(VaultConfig::for_testing()).await.unwrap();
    vault.register_category("notes", "notes").await.unwrap();
    vault
        .write_document("notes/a.md", "a\n", memvault::WriteOptions::replace())
        .await
        .unwrap();
    assert!(vault.paths().is_none());
    assert!(vault.store().exists("entries/notes/a.md").await.unwrap());
}
