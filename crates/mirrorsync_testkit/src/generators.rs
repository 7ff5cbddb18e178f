//! Property-based test generators using proptest.

use crate::fixtures::ts;
use mirrorsync_protocol::{EntityRecord, FeedEvent, MutationRequest, PendingMutation};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for record ids drawn from a small pool, so collisions happen.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a1", "a2", "a3", "a4", "a5"]).prop_map(str::to_string)
}

/// Strategy for full rows: id, `updatedAt` and the same field set.
///
/// Convergence only holds for full rows; see `partial_rows_are_excluded_from_convergence`.
pub fn full_row_strategy() -> impl Strategy<Value = EntityRecord> {
    (record_id_strategy(), 0i64..100_000, "[a-z]{0,8}", 0u32..1000).prop_map(
        |(id, secs, title, size)| {
            EntityRecord::new(id)
                .with_updated_at(ts(secs))
                .with_field("title", title)
                .with_field("size", size)
        },
    )
}

/// Strategy for rows that may lack `updatedAt`.
pub fn maybe_timestamped_row_strategy() -> impl Strategy<Value = EntityRecord> {
    (full_row_strategy(), any::<bool>()).prop_map(|(row, timestamped)| {
        if timestamped {
            row
        } else {
            let mut value = row.into_value();
            if let Some(fields) = value.as_object_mut() {
                fields.remove("updatedAt");
            }
            EntityRecord::from_value(value).unwrap_or_default()
        }
    })
}

/// Strategy for insert/update events over full rows with distinct
/// `(id, updatedAt)` pairs.
pub fn upsert_events_strategy(max: usize) -> impl Strategy<Value = Vec<FeedEvent>> {
    prop::collection::vec(full_row_strategy(), 0..max)
        .prop_map(|rows| {
            let mut seen = std::collections::HashSet::new();
            rows.into_iter()
                .filter(|row| seen.insert((row.id(), row.updated_at())))
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|rows| {
            let len = rows.len();
            (Just(rows), prop::collection::vec(any::<bool>(), len))
        })
        .prop_map(|(rows, inserts)| {
            rows.into_iter()
                .zip(inserts)
                .map(|(row, insert)| {
                    if insert {
                        FeedEvent::insert(row)
                    } else {
                        FeedEvent::update(row)
                    }
                })
                .collect()
        })
}

/// Strategy for queued mutations with unique ids.
pub fn mutations_strategy(max: usize) -> impl Strategy<Value = Vec<PendingMutation>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["POST", "PATCH", "PUT", "DELETE"]),
            "[a-z0-9]{1,6}",
        ),
        0..max,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (method, segment))| {
                PendingMutation::with_id(
                    format!("m{i}"),
                    MutationRequest::new(
                        method,
                        format!("/api/assets/{segment}"),
                        Some(json!({"seq": i})),
                    ),
                )
            })
            .collect()
    })
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
