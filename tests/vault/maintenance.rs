//! Aging, decay and validation on disk

use crate::common::*;
use chrono::Duration;
use memvault::{ContextPriority, VaultConfig};

#[tokio::test]
async fn idle_document_moves_to_archive_namespace() {
    let mut tv = TestVault::new().await;
    tv.put("notes/stale.md", "# Stale\n\nOld thoughts.\n").await;
    tv.put("notes/fresh.md", "# Fresh\n").await;

    tv.clock.advance(Duration::days(60));
    tv.vault.read_document("notes/fresh.md").await.unwrap();
    let report = tv.vault.run_maintenance().await.unwrap();
    assert_eq!(report.archived, vec!["notes/stale.md"]);
    assert!(report.flushed >= 1);

    assert!(!tv.path().join("entries/notes/stale.md").exists());
    assert_eq!(
        std::fs::read_to_string(tv.path().join("archive/notes/stale.md")).unwrap(),
        "# Stale\n\nOld thoughts.\n"
    );

    let mut tv = tv.reopen().await;
    let entry = tv.vault.entry("notes/stale.md").unwrap();
    assert!(entry.archived);
    assert_eq!(entry.context_priority, ContextPriority::Low);
    assert_eq!(tv.vault.entry("notes/fresh.md").unwrap().access_count, 1);
    assert_eq!(
        tv.vault.read_document("notes/stale.md").await.unwrap(),
        "# Stale\n\nOld thoughts.\n"
    );
    assert!(tv.vault.active_set().iter().all(|e| e.path != "notes/stale.md"));
}

#[tokio::test]
async fn decay_steps_one_level_per_run() {
    let mut tv = TestVault::new().await;
    tv.put("notes/a.md", "---\ncontext_priority: high\n---\nonce read\n").await;
    tv.vault.read_document("notes/a.md").await.unwrap();

    tv.clock.advance(Duration::days(20));
    let report = tv.vault.run_maintenance().await.unwrap();
    assert_eq!(
        report.decayed,
        vec![("notes/a.md".to_string(), ContextPriority::High, ContextPriority::Medium)]
    );

    let report = tv.vault.run_maintenance().await.unwrap();
    assert_eq!(report.decayed[0].2, ContextPriority::Low);

    let report = tv.vault.run_maintenance().await.unwrap();
    assert!(report.decayed.is_empty());
    assert!(report.archived.is_empty());
}

#[tokio::test]
async fn frequently_used_documents_keep_priority() {
    let mut tv = TestVault::new().await;
    tv.put("notes/hot.md", "hot\n").await;
    for _ in 0..11 {
        tv.vault.read_document("notes/hot.md").await.unwrap();
    }
    tv.clock.advance(Duration::days(30));
    let report = tv.vault.run_maintenance().await.unwrap();
    assert!(report.decayed.is_empty());
    assert_eq!(
        tv.vault.entry("notes/hot.md").unwrap().context_priority,
        ContextPriority::Medium
    );
}

#[tokio::test]
async fn validation_reports_missing_documents() {
    let mut tv = TestVault::new().await;
    for name in ["a", "b", "c", "d", "e"] {
        tv.put(&format!("notes/{}.md", name), "x\n").await;
    }
    std::fs::remove_file(tv.path().join("entries/notes/c.md")).unwrap();

    let report = tv.vault.validate().await.unwrap();
    assert_eq!(report.missing, vec!["notes/c.md"]);
    assert!(report.removed.is_empty());
    assert!(!report.is_clean());
    assert_eq!(tv.vault.last_validation(), Some(&report));
    assert_eq!(tv.vault.index().len(), 5);
}

#[tokio::test]
async fn auto_clean_removes_missing_unpinned_entries() {
    let mut tv = TestVault::with_config(VaultConfig::for_testing().with_auto_clean(true)).await;
    for name in ["a", "b", "c", "d", "e"] {
        tv.put(&format!("notes/{}.md", name), "x\n").await;
    }
    tv.put("notes/keep.md", "---\npinned: true\n---\nkeep\n").await;
    std::fs::remove_file(tv.path().join("entries/notes/c.md")).unwrap();
    std::fs::remove_file(tv.path().join("entries/notes/keep.md")).unwrap();

    let report = tv.vault.validate().await.unwrap();
    assert_eq!(report.removed, vec!["notes/c.md"]);
    assert!(report.aborted.is_empty());

    let tv = tv.reopen().await;
    assert!(tv.vault.entry("notes/c.md").is_none());
    assert!(tv.vault.entry("notes/keep.md").is_some());
}

#[tokio::test]
async fn auto_clean_is_guarded() {
    let mut tv = TestVault::with_config(VaultConfig::for_testing().with_auto_clean(true)).await;
    for name in ["a", "b", "c"] {
        tv.put(&format!("notes/{}.md", name), "x\n").await;
    }
    std::fs::remove_file(tv.path().join("entries/notes/a.md")).unwrap();
    std::fs::remove_file(tv.path().join("entries/notes/b.md")).unwrap();

    let report = tv.vault.validate().await.unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(report.aborted.len(), 1);
    assert_eq!(tv.vault.index().len(), 3);
    assert_eq!(tv.vault.audit_log().await.unwrap().len(), 1);
}
