//! Sharded index: guarded rewrites, shard parts and the audit log

use crate::common::*;
use memvault::{CommitOutcome, Error, IndexEntry, MemVault};

fn entries(tv: &TestVault, range: std::ops::Range<usize>) -> Vec<IndexEntry> {
    range
        .map(|i| IndexEntry::new(format!("notes/{:03}.md", i), tv.clock.now()))
        .collect()
}

#[tokio::test]
async fn mass_removal_aborts_and_small_change_commits() {
    let mut tv = TestVault::new().await;
    let initial = entries(&tv, 0..100);
    let outcome = tv.vault.rebuild_shard("notes", initial).await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { added: 100, removed: 0, entries: 100 }));

    // 40 removed out of 100 trips the removal ratio.
    let mut drastic = entries(&tv, 40..100);
    drastic.extend(entries(&tv, 100..105));
    let outcome = tv.vault.rebuild_shard("notes", drastic).await.unwrap();
    let report = match outcome {
        CommitOutcome::Aborted(report) => report,
        other => panic!("expected abort, got {:?}", other),
    };
    assert_eq!(report.removed.len(), 40);
    assert_eq!(report.added.len(), 5);
    assert_eq!(report.previous, 100);
    assert_eq!(tv.vault.index().len(), 100);

    let mut tv = tv.reopen().await;
    assert_eq!(tv.vault.index().len(), 100);
    assert!(tv.vault.entry("notes/000.md").is_some());
    assert!(tv.vault.entry("notes/100.md").is_none());

    let audit = tv.vault.audit_log().await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].category, "notes");
    assert_eq!(audit[0].removed.len(), 40);

    let raw = std::fs::read_to_string(tv.path().join("audit.log")).unwrap();
    let line: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(line["event"], "consistency-abort");

    let mut modest = entries(&tv, 5..100);
    modest.extend(entries(&tv, 100..103));
    let outcome = tv.vault.rebuild_shard("notes", modest).await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { added: 3, removed: 5, entries: 98 }));

    let tv = tv.reopen().await;
    assert_eq!(tv.vault.index().len(), 98);
    assert!(tv.vault.entry("notes/004.md").is_none());
    assert!(tv.vault.entry("notes/102.md").is_some());
    assert_eq!(tv.vault.audit_log().await.unwrap().len(), 1);
}

#[tokio::test]
async fn aborted_rebuild_reports_as_error_on_demand() {
    let mut tv = TestVault::new().await;
    let initial = entries(&tv, 0..10);
    assert!(tv.vault.rebuild_shard("notes", initial).await.unwrap().is_committed());

    let outcome = tv.vault.rebuild_shard("notes", Vec::new()).await.unwrap();
    assert!(!outcome.is_committed());
    assert!(matches!(
        outcome.ensure_committed(),
        Err(Error::ConsistencyAbort { removed: 10, .. })
    ));
}

#[tokio::test]
async fn large_shard_is_written_in_parts() {
    let mut tv = TestVault::new().await;
    let initial = entries(&tv, 0..100);
    assert!(tv.vault.rebuild_shard("notes", initial).await.unwrap().is_committed());

    let dir = tv.path().join("entries/notes");
    assert!(dir.join("index.json").is_file());
    assert!(dir.join("index.part2.json").is_file());
    for file in std::fs::read_dir(&dir).unwrap() {
        let file = file.unwrap();
        let name = file.file_name().to_string_lossy().into_owned();
        if name.starts_with("index") {
            assert!(file.metadata().unwrap().len() <= 4 * 1024, "{} too large", name);
        }
    }

    // Shrinking back to one file deletes the stale parts.
    let mut n = 100;
    while n > 5 {
        n = (n * 3 / 4).max(5);
        let kept = entries(&tv, 0..n);
        let outcome = tv.vault.rebuild_shard("notes", kept).await.unwrap();
        assert!(outcome.is_committed(), "shrinking to {} aborted", n);
    }

    assert_eq!(tv.vault.index().len(), 5);
    assert!(!dir.join("index.part2.json").exists());
}

#[tokio::test]
async fn missing_shard_part_fails_open() {
    let mut tv = TestVault::new().await;
    let initial = entries(&tv, 0..100);
    assert!(tv.vault.rebuild_shard("notes", initial).await.unwrap().is_committed());

    let dir = tv.path().join("entries/notes");
    let primary = std::fs::read_to_string(dir.join("index.json")).unwrap();
    assert!(primary.contains("\"parts\""));
    assert!(dir.join("index.part3.json").is_file());
    std::fs::remove_file(dir.join("index.part2.json")).unwrap();

    let err = MemVault::open(tv.path()).await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
    assert!(dir.join("index.part3.json").is_file());
}

#[tokio::test]
async fn rebuild_rejects_entries_outside_the_shard() {
    let mut tv = TestVault::new().await;
    tv.vault.register_category("people", "people").await.unwrap();
    let stray = vec![IndexEntry::new("people/ann.md", tv.clock.now())];
    let err = tv.vault.rebuild_shard("notes", stray).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn writes_route_to_their_category_shard() {
    let mut tv = TestVault::new().await;
    tv.vault.register_category("people", "people").await.unwrap();
    assert_eq!(tv.put("people/ann.md", "# Ann\n").await.category, "people");
    assert_eq!(tv.put("notes/a.md", "a\n").await.category, "notes");

    let people = std::fs::read_to_string(tv.path().join("entries/people/index.json")).unwrap();
    assert!(people.contains("people/ann.md"));
    assert!(!people.contains("notes/a.md"));

    let root = std::fs::read_to_string(tv.path().join("entries/index.json")).unwrap();
    assert!(root.contains("people/index.json"));
}

#[tokio::test]
async fn nested_category_takes_its_own_writes() {
    let mut tv = TestVault::new().await;
    tv.vault.register_category("work", "notes/work").await.unwrap();
    assert_eq!(tv.put("notes/work/plan.md", "# Plan\n").await.category, "work");
    assert_eq!(tv.put("notes/home.md", "# Home\n").await.category, "notes");

    let work = std::fs::read_to_string(tv.path().join("entries/notes/work/index.json")).unwrap();
    assert!(work.contains("notes/work/plan.md"));
    let notes = std::fs::read_to_string(tv.path().join("entries/notes/index.json")).unwrap();
    assert!(!notes.contains("notes/work/plan.md"));

    let tv = tv.reopen().await;
    assert_eq!(tv.vault.entry("notes/work/plan.md").unwrap().title, "Plan");
}
