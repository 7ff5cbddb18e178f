//! Last-writer-wins conflict resolution.
//!
//! The rule is local and per key: an incoming version replaces the stored
//! one when its `updatedAt` is greater than or equal to the stored
//! `updatedAt`. No global clock is needed, only per-record comparability.
//!
//! - An incoming record without `updatedAt` counts as "now" and always wins.
//! - A stored record without `updatedAt` counts as the epoch and always loses
//!   to a timestamped incoming record.

use crate::record::EntityRecord;
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};

/// Outcome of comparing an incoming version with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming version is applied (shallow-merged).
    AcceptIncoming,
    /// The stored version is strictly newer and is kept.
    KeepExisting,
}

/// Resolves a conflict between two timestamps.
pub fn resolve(existing: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> Resolution {
    match (existing, incoming) {
        (_, None) => Resolution::AcceptIncoming,
        (None, Some(_)) => Resolution::AcceptIncoming,
        (Some(stored), Some(new)) if new >= stored => Resolution::AcceptIncoming,
        (Some(_), Some(_)) => Resolution::KeepExisting,
    }
}

/// Returns true if `incoming` may replace `existing`.
pub fn accepts(existing: &EntityRecord, incoming: &EntityRecord) -> bool {
    resolve(existing.updated_at(), incoming.updated_at()) == Resolution::AcceptIncoming
}

/// Snapshot ordering: newest `updatedAt` first, missing timestamps last,
/// ties broken by ascending id so the order is deterministic.
pub fn snapshot_order(a: &EntityRecord, b: &EntityRecord) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

fn sort_key(record: &EntityRecord) -> (Reverse<i64>, Option<String>) {
    let millis = record.updated_at().map_or(0, |at| at.timestamp_millis());
    (Reverse(millis), record.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn resolution_table() {
        assert_eq!(resolve(None, None), Resolution::AcceptIncoming);
        assert_eq!(resolve(Some(at(10)), None), Resolution::AcceptIncoming);
        assert_eq!(resolve(None, Some(at(10))), Resolution::AcceptIncoming);
        assert_eq!(resolve(Some(at(10)), Some(at(10))), Resolution::AcceptIncoming);
        assert_eq!(resolve(Some(at(10)), Some(at(11))), Resolution::AcceptIncoming);
        assert_eq!(resolve(Some(at(10)), Some(at(9))), Resolution::KeepExisting);
    }

    #[test]
    fn accepts_compares_records() {
        let stored = EntityRecord::new("a1").with_updated_at(at(100));
        let older = EntityRecord::new("a1").with_updated_at(at(50));
        let undated = EntityRecord::new("a1");

        assert!(!accepts(&stored, &older));
        assert!(accepts(&stored, &undated));
        assert!(accepts(&older, &stored));
    }

    #[test]
    fn snapshot_order_newest_first_undated_last() {
        let mut records = vec![
            EntityRecord::new("undated"),
            EntityRecord::new("old").with_updated_at(at(1)),
            EntityRecord::new("new").with_updated_at(at(3)),
            EntityRecord::new("mid").with_updated_at(at(2)),
        ];
        records.sort_by(snapshot_order);

        let ids: Vec<_> = records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "undated"]);
    }

    #[test]
    fn snapshot_order_ties_by_id() {
        let mut records = vec![
            EntityRecord::new("b").with_updated_at(at(5)),
            EntityRecord::new("a").with_updated_at(at(5)),
        ];
        records.sort_by(snapshot_order);
        assert_eq!(records[0].id().as_deref(), Some("a"));
    }
}
