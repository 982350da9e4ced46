//! Aging policy
//!
//! Run periodically, never on the write path. Pinned and already archived
//! entries are left alone.

use chrono::{DateTime, Duration, Utc};
use memvault_core::{ContextPriority, IndexEntry};

use crate::config::AgingConfig;

/// What aging does to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingAction {
    /// Move the document to the archive namespace and force low priority
    Archive,
    /// Step priority down one level
    Decay {
        /// Priority before
        from: ContextPriority,
        /// Priority after
        to: ContextPriority,
    },
}

/// Thresholds the policy compares entries against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgingPolicy {
    archive_after: Duration,
    decay_after: Duration,
    low_access_threshold: u64,
    frequent_access_threshold: u64,
}

impl From<&AgingConfig> for AgingPolicy {
    fn from(config: &AgingConfig) -> Self {
        AgingPolicy {
            archive_after: config.archive_after(),
            decay_after: config.decay_after(),
            low_access_threshold: config.low_access_threshold,
            frequent_access_threshold: config.frequent_access_threshold,
        }
    }
}

impl Default for AgingPolicy {
    fn default() -> Self {
        AgingPolicy::from(&AgingConfig::default())
    }
}

impl AgingPolicy {
    /// Decide the action for `entry` at `now`, if any
    pub fn decide(&self, entry: &IndexEntry, now: DateTime<Utc>) -> Option<AgingAction> {
        if entry.pinned || entry.archived {
            return None;
        }
        let idle = now - entry.last_touched();

        if entry.access_count == 0 && idle > self.archive_after {
            return Some(AgingAction::Archive);
        }

        let frequent = entry.access_count > self.frequent_access_threshold
            || entry.edit_count > self.frequent_access_threshold;
        if frequent || entry.context_priority == ContextPriority::Low {
            return None;
        }

        if idle > self.decay_after && entry.access_count < self.low_access_threshold {
            let from = entry.context_priority;
            return Some(AgingAction::Decay {
                from,
                to: from.step_down(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn entry(priority: ContextPriority) -> IndexEntry {
        let mut e = IndexEntry::new("notes/a.md", day(0));
        e.context_priority = priority;
        e
    }

    #[test]
    fn test_unread_stale_entry_is_archived() {
        let policy = AgingPolicy::default();
        let e = entry(ContextPriority::High);
        assert_eq!(policy.decide(&e, day(57)), Some(AgingAction::Archive));
    }

    #[test]
    fn test_pinned_is_exempt() {
        let policy = AgingPolicy::default();
        let mut e = entry(ContextPriority::High);
        e.pinned = true;
        assert_eq!(policy.decide(&e, day(365)), None);
    }

    #[test]
    fn test_decay_steps_one_level() {
        let policy = AgingPolicy::default();
        let mut e = entry(ContextPriority::High);
        e.touch(day(0));
        assert_eq!(
            policy.decide(&e, day(15)),
            Some(AgingAction::Decay {
                from: ContextPriority::High,
                to: ContextPriority::Medium,
            })
        );
        e.context_priority = ContextPriority::Medium;
        assert_eq!(
            policy.decide(&e, day(15)),
            Some(AgingAction::Decay {
                from: ContextPriority::Medium,
                to: ContextPriority::Low,
            })
        );
        e.context_priority = ContextPriority::Low;
        assert_eq!(policy.decide(&e, day(15)), None);
    }

    #[test]
    fn test_recent_entry_untouched() {
        let policy = AgingPolicy::default();
        let e = entry(ContextPriority::High);
        assert_eq!(policy.decide(&e, day(13)), None);
    }

    #[test]
    fn test_frequent_entries_do_not_decay() {
        let policy = AgingPolicy::default();
        let mut e = entry(ContextPriority::High);
        e.access_count = 1;
        e.edit_count = 11;
        assert_eq!(policy.decide(&e, day(30)), None);
    }

    #[test]
    fn test_well_read_entries_do_not_decay() {
        let policy = AgingPolicy::default();
        let mut e = entry(ContextPriority::Medium);
        e.access_count = 3;
        assert_eq!(policy.decide(&e, day(30)), None);
    }

    #[test]
    fn test_read_entries_are_not_archived() {
        let policy = AgingPolicy::default();
        let mut e = entry(ContextPriority::Medium);
        e.touch(day(0));
        assert!(matches!(
            policy.decide(&e, day(100)),
            Some(AgingAction::Decay { .. })
        ));
    }
}
