//! Priority ordering and the active working set
//!
//! Entries sort by `context_priority` (high first), then by `last_accessed`
//! descending with never-read entries last, then by insertion order.

use std::cmp::Ordering;

use memvault_core::{ContextPriority, IndexEntry};

/// Compare two entries by priority then recency
///
/// Equal entries compare `Equal`; a stable sort keeps insertion order.
pub fn compare(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    a.context_priority
        .cmp(&b.context_priority)
        .then_with(|| b.last_accessed.cmp(&a.last_accessed))
}

/// Sort entries into priority order, stably
pub fn order<'a>(entries: impl IntoIterator<Item = &'a IndexEntry>) -> Vec<&'a IndexEntry> {
    let mut sorted: Vec<&IndexEntry> = entries.into_iter().collect();
    sorted.sort_by(|a, b| compare(a, b));
    sorted
}

/// The first `cap` entries in priority order that are not low priority
/// and not archived
pub fn active_set<'a>(
    entries: impl IntoIterator<Item = &'a IndexEntry>,
    cap: usize,
) -> Vec<&'a IndexEntry> {
    order(entries)
        .into_iter()
        .filter(|e| !e.archived && e.context_priority != ContextPriority::Low)
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn entry(name: &str, priority: ContextPriority, accessed: Option<u32>) -> IndexEntry {
        let mut e = IndexEntry::new(format!("notes/{}.md", name), at(1));
        e.context_priority = priority;
        e.last_accessed = accessed.map(at);
        e
    }

    fn names(entries: &[&IndexEntry]) -> Vec<String> {
        entries.iter().map(|e| e.title.clone()).collect()
    }

    #[test]
    fn test_priority_then_recency() {
        use ContextPriority::*;
        let entries = vec![
            entry("low", Low, Some(20)),
            entry("high-old", High, Some(2)),
            entry("medium", Medium, Some(25)),
            entry("high-new", High, Some(10)),
            entry("high-never", High, None),
        ];
        assert_eq!(
            names(&order(&entries)),
            vec!["high-new", "high-old", "high-never", "medium", "low"]
        );
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        use ContextPriority::*;
        let entries = vec![
            entry("b", Medium, Some(5)),
            entry("a", Medium, Some(5)),
            entry("c", Medium, Some(5)),
        ];
        assert_eq!(names(&order(&entries)), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_active_set_excludes_low_and_archived() {
        use ContextPriority::*;
        let mut archived = entry("archived", High, Some(30));
        archived.archived = true;
        let entries = vec![
            entry("low", Low, Some(28)),
            entry("medium", Medium, Some(1)),
            archived,
            entry("high", High, Some(3)),
        ];
        assert_eq!(names(&active_set(&entries, 10)), vec!["high", "medium"]);
        assert_eq!(names(&active_set(&entries, 1)), vec!["high"]);
        assert!(active_set(&entries, 0).is_empty());
    }
}
