//! Benchmark utilities.

#![warn(missing_docs)]

use chrono::{TimeZone, Utc};
use mirrorsync_protocol::EntityRecord;
use rand::Rng;

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` asset rows with random timestamps over `id_space` ids.
pub fn generate_records(count: usize, id_space: usize) -> Vec<EntityRecord> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let id = format!("asset-{}", rng.gen_range(0..id_space.max(1)));
            let secs = rng.gen_range(1_700_000_000i64..1_800_000_000);
            let updated_at = Utc.timestamp_opt(secs, 0).single().unwrap_or_default();
            EntityRecord::new(id)
                .with_updated_at(updated_at)
                .with_field("title", format!("clip {}", rng.gen::<u32>()))
                .with_field("durationMs", rng.gen_range(0u64..3_600_000))
        })
        .collect()
}

/// Serialize records the way the engine persists a collection.
pub fn encode_collection(records: &[EntityRecord]) -> Vec<u8> {
    serde_json::to_vec(records).unwrap_or_default()
}
