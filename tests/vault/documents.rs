//! Document writes: merge, split, backups and limits

use crate::common::*;
use memvault::{Error, MergeOptions, StorageLimitError, VaultConfig, WriteOptions};

const PART: usize = 512 * 1024;

#[tokio::test]
async fn merge_write_updates_sections_in_place() {
    let mut tv = TestVault::new().await;
    tv.put(
        "notes/garden.md",
        "## Tasks\n- [ ] order seeds\n- [ ] fix fence\n\n## Ideas\nRaised beds.\n",
    )
    .await;

    tv.vault
        .write_document(
            "notes/garden.md",
            "## Tasks\n- [x] order seeds\n- [ ] fix fence\n- [ ] build trellis\n- [ ] order seeds\n",
            WriteOptions::merged(MergeOptions::deduped()),
        )
        .await
        .unwrap();

    let on_disk = std::fs::read_to_string(tv.path().join("entries/notes/garden.md")).unwrap();
    assert!(on_disk.contains("- [x] order seeds"));
    assert!(!on_disk.contains("- [ ] order seeds"));
    assert!(on_disk.contains("- [ ] fix fence"));
    assert!(on_disk.contains("- [ ] build trellis"));
    assert!(on_disk.contains("Raised beds."));
    assert!(on_disk.find("## Tasks").unwrap() < on_disk.find("## Ideas").unwrap());
    assert_eq!(tv.vault.entry("notes/garden.md").unwrap().edit_count, 2);
}

#[tokio::test]
async fn large_document_is_split_and_reassembled() {
    let mut tv = TestVault::with_config(VaultConfig::default()).await;
    let content = paragraphs(1_200_000);

    let outcome = tv.put("notes/big.md", &content).await;
    assert!(outcome.split);
    assert_eq!(outcome.parts.len(), 3);
    assert_eq!(outcome.size, content.len() as u64);

    let dir = tv.path().join("entries/notes");
    for n in 1..=3 {
        let part = dir.join(format!("big.part{}.md", n));
        let len = std::fs::metadata(&part).unwrap().len() as usize;
        assert!(len > 0 && len <= PART, "part {} is {} bytes", n, len);
    }
    let stub = std::fs::read_to_string(dir.join("big.md")).unwrap();
    assert!(stub.starts_with("---\n"));
    assert!(stub.contains("parts"));
    assert!(dir.join("memory_index.json").is_file());

    let mut tv = tv.reopen().await;
    assert_eq!(tv.vault.read_document("notes/big.md").await.unwrap(), content);

    let across = tv.vault.read_range("notes/big.md", PART as u64 - 500, 1000).await.unwrap();
    assert_eq!(across.bytes, content.as_bytes()[PART - 500..PART + 500].to_vec());
    assert!(!across.truncated);

    let tail = tv
        .vault
        .read_range("notes/big.md", content.len() as u64 - 10, 100)
        .await
        .unwrap();
    assert_eq!(tail.bytes, content.as_bytes()[content.len() - 10..].to_vec());
    assert!(tail.truncated);
}

#[tokio::test]
async fn shrinking_a_split_document_removes_parts() {
    let mut tv = TestVault::new().await;
    let big = paragraphs(6 * 1024);
    assert!(tv.put("notes/big.md", &big).await.split);
    assert!(tv.path().join("entries/notes/big.part1.md").is_file());

    let outcome = tv.put("notes/big.md", "small now\n").await;
    assert!(!outcome.split);
    assert!(!tv.path().join("entries/notes/big.part1.md").exists());
    assert_eq!(
        std::fs::read_to_string(tv.path().join("entries/notes/big.md")).unwrap(),
        "small now\n"
    );
}

#[tokio::test]
async fn too_many_parts_fails_before_writing() {
    let mut tv = TestVault::new().await;
    let huge = paragraphs(20 * 1024);
    let err = tv
        .vault
        .write_document("notes/huge.md", &huge, WriteOptions::replace())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StorageLimit(StorageLimitError::PartsLimitExceeded { max: 16, .. })
    ));
    assert!(!tv.path().join("entries/notes/huge.md").exists());
    assert!(!tv.path().join("entries/notes/huge.part1.md").exists());
    assert!(tv.vault.entry("notes/huge.md").is_none());
}

#[tokio::test]
async fn rewrite_keeps_backup_for_rollback() {
    let mut tv = TestVault::new().await;
    tv.put("notes/a.md", "first\n").await;
    let outcome = tv.put("notes/a.md", "second\n").await;
    let backup = outcome.backup.expect("rewrite takes a backup");
    assert!(backup.starts_with("backups/"));
    assert!(tv.path().join(&backup).is_file());

    tv.vault.rollback("notes/a.md").await.unwrap();
    let mut tv = tv.reopen().await;
    assert_eq!(tv.vault.read_document("notes/a.md").await.unwrap(), "first\n");
}

#[tokio::test]
async fn delete_removes_file_and_entry() {
    let mut tv = TestVault::new().await;
    tv.put("notes/a.md", "a\n").await;
    assert!(tv.vault.delete_document("notes/a.md").await.unwrap());
    assert!(!tv.path().join("entries/notes/a.md").exists());

    let tv = tv.reopen().await;
    assert!(tv.vault.entry("notes/a.md").is_none());
}
