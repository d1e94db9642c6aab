//! The router's replicated entities: levels, sources, destinations and
//! crosspoints. Field names match the driver-to-host wire shape exactly
//! (`id`, `name`, `levels`, `destination`, `destination_level`, `source`,
//! `source_level`, `locked`) so a host can serialize these directly.

use serde::{Deserialize, Serialize};

/// A named signal plane within the router (e.g. "SDI", "AES").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: u32,
    pub name: String,
}

/// An input signal, identified by id and name, declaring which levels it
/// populates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: u32,
    pub name: String,
    /// Ascending, deduplicated level ids this source populates.
    pub levels: Vec<u32>,
}

/// An output endpoint, identified by id and name, declaring which levels
/// it consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: u32,
    pub name: String,
    /// Ascending, deduplicated level ids this destination consumes.
    pub levels: Vec<u32>,
}

/// An assignment of `(source, source_level)` to `(destination,
/// destination_level)`. Exactly one exists per occupied destination-level
/// slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crosspoint {
    pub destination: u32,
    pub destination_level: u32,
    pub source: u32,
    pub source_level: u32,
    pub locked: bool,
}

fn insert_sorted_dedup(levels: &mut Vec<u32>, additions: impl IntoIterator<Item = u32>) {
    for id in additions {
        if !levels.contains(&id) {
            levels.push(id);
        }
    }
    levels.sort_unstable();
}

impl Destination {
    pub(crate) fn extend_levels(&mut self, additions: impl IntoIterator<Item = u32>) {
        insert_sorted_dedup(&mut self.levels, additions);
    }
}

impl Source {
    pub(crate) fn extend_levels(&mut self, additions: impl IntoIterator<Item = u32>) {
        insert_sorted_dedup(&mut self.levels, additions);
    }
}
