//! In-memory keyed collection of one entity kind.

use mirrorsync_protocol::{lww, EntityRecord};
use std::collections::HashMap;

/// Records of one kind, keyed by id.
///
/// Every record held has an id. Snapshots are ordered by
/// [`lww::snapshot_order`], so two stores with the same content yield the
/// same snapshot regardless of insertion history.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    records: HashMap<String, EntityRecord>,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from records taken verbatim, without merging.
    ///
    /// Records without an id are dropped. A later duplicate id replaces an
    /// earlier one.
    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let mut store = Self::new();
        store.replace_all(records);
        store
    }

    /// Merges an incoming version under last-writer-wins.
    ///
    /// Absent ids are inserted. Present ids are shallow-merged when the
    /// incoming `updatedAt` is not older than the stored one. Returns true
    /// if the store changed.
    pub fn merge_record(&mut self, incoming: EntityRecord) -> bool {
        let Some(id) = incoming.id() else {
            return false;
        };

        match self.records.get_mut(&id) {
            None => {
                self.records.insert(id, incoming);
                true
            }
            Some(existing) if lww::accepts(existing, &incoming) => {
                existing.merge_from(&incoming);
                true
            }
            Some(_) => false,
        }
    }

    /// Removes a record unconditionally. Returns true if it was present.
    pub fn remove_record(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    /// Replaces the whole content. Records without an id are dropped.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = EntityRecord>) {
        self.records = records
            .into_iter()
            .filter_map(|record| record.id().map(|id| (id, record)))
            .collect();
    }

    /// Returns the records in snapshot order.
    pub fn snapshot(&self) -> Vec<EntityRecord> {
        let mut records: Vec<EntityRecord> = self.records.values().cloned().collect();
        records.sort_by(lww::snapshot_order);
        records
    }

    /// Returns a record by id.
    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    /// Returns true if the id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
