//! Entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named category of mirrored entities.
///
/// Each kind has its own store, its own change feed channel and its own
/// persisted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Asset records (the primary, list-fetched kind).
    Asset,
    /// Derived-job records, also embedded on assets as the latest job.
    Job,
    /// Usage records.
    Usage,
}

impl EntityKind {
    /// Every kind, in a fixed order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Asset, EntityKind::Job, EntityKind::Usage];

    /// Returns the kind name used for feed channels and event routing.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Asset => "Asset",
            EntityKind::Job => "Job",
            EntityKind::Usage => "Usage",
        }
    }

    /// Parses a kind name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns the suffix of the persisted collection key.
    pub fn storage_suffix(&self) -> &'static str {
        match self {
            EntityKind::Asset => "assets",
            EntityKind::Job => "jobs",
            EntityKind::Usage => "usage",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn unknown_name() {
        assert_eq!(EntityKind::from_name("Invoice"), None);
        assert_eq!(EntityKind::from_name("asset"), None);
    }

    #[test]
    fn storage_suffixes_are_distinct() {
        let mut suffixes: Vec<_> = EntityKind::ALL.iter().map(|k| k.storage_suffix()).collect();
        suffixes.sort();
        suffixes.dedup();
        assert_eq!(suffixes.len(), 3);
    }
}
