//! The in-memory replica of router state.
//!
//! Each primary table and its name-index are independently locked — there
//! is no single lock covering both. Mutation sequences that touch both
//! release the first lock before acquiring the second; the dispatcher is
//! the sole mutator and is single threaded, so these multi-lock sequences
//! never race against each other.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::entity::{Crosspoint, Destination, Level, Source};

/// How an id-bearing protocol argument should be resolved against a
/// name-index. Dialects map their own sigils onto this before calling into
/// the store; adding a new sigil to a dialect is the only place that needs
/// to change.
#[derive(Debug, Clone, Copy)]
pub enum IdRef<'a> {
    /// The argument carried the numeric id directly.
    Numeric(i64),
    /// The argument carried a name that must be looked up.
    Name(&'a str),
}

/// A primary id-keyed table and its name index, each behind its own lock.
#[derive(Default)]
struct Table<T> {
    by_id: RwLock<HashMap<u32, T>>,
    by_name: RwLock<HashMap<String, u32>>,
}

/// The router's replicated state: levels, sources, destinations,
/// crosspoints, and their name indexes.
#[derive(Default)]
pub struct StateStore {
    levels: Table<Level>,
    sources: Table<Source>,
    destinations: Table<Destination>,
    /// destination id -> destination level id -> crosspoint
    crosspoints: RwLock<HashMap<u32, HashMap<u32, Crosspoint>>>,
}

fn sorted_by_id<T: Clone>(map: &HashMap<u32, T>, id_of: impl Fn(&T) -> u32) -> Vec<T> {
    let mut values: Vec<T> = map.values().cloned().collect();
    values.sort_unstable_by_key(|v| id_of(v));
    values
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve<T>(table: &Table<T>, r: IdRef<'_>) -> Option<u32> {
        match r {
            IdRef::Numeric(n) => u32::try_from(n).ok(),
            IdRef::Name(name) => table.by_name.read().await.get(name).copied(),
        }
    }

    // -- Levels --------------------------------------------------------

    /// Create a level, or rename it in place if an entry with that id
    /// already exists. The by-id table is updated first, then the
    /// by-name index — each under its own lock, one at a time, never
    /// nested — so a rename deletes the old name-index key and inserts
    /// the new one as two sequential, independently-locked steps.
    pub async fn upsert_level(&self, id: u32, name: String) {
        let old_name = {
            let mut by_id = self.levels.by_id.write().await;
            let old_name = by_id.get(&id).map(|l| l.name.clone());
            by_id.insert(id, Level { id, name: name.clone() });
            old_name
        };
        let mut by_name = self.levels.by_name.write().await;
        if let Some(old_name) = old_name {
            by_name.remove(&old_name);
        }
        by_name.insert(name, id);
    }

    pub async fn resolve_level_id(&self, r: IdRef<'_>) -> Option<u32> {
        Self::resolve(&self.levels, r).await
    }

    pub async fn levels(&self) -> Vec<Level> {
        sorted_by_id(&self.levels.by_id.read().await, |l| l.id)
    }

    pub async fn level(&self, id: u32) -> Option<Level> {
        self.levels.by_id.read().await.get(&id).cloned()
    }

    // -- Sources ---------------------------------------------------------

    pub async fn upsert_source_name(&self, id: u32, name: String) {
        let old_name = {
            let mut by_id = self.sources.by_id.write().await;
            if let Some(existing) = by_id.get(&id) {
                let old_name = existing.name.clone();
                let mut updated = existing.clone();
                updated.name = name.clone();
                by_id.insert(id, updated);
                Some(old_name)
            } else {
                by_id.insert(
                    id,
                    Source {
                        id,
                        name: name.clone(),
                        levels: Vec::new(),
                    },
                );
                None
            }
        };
        let mut by_name = self.sources.by_name.write().await;
        if let Some(old_name) = old_name {
            by_name.remove(&old_name);
        }
        by_name.insert(name, id);
    }

    pub async fn extend_source_levels(&self, id: u32, additions: impl IntoIterator<Item = u32>) {
        let mut by_id = self.sources.by_id.write().await;
        let entry = by_id.entry(id).or_insert_with(|| Source {
            id,
            name: String::new(),
            levels: Vec::new(),
        });
        entry.extend_levels(additions);
    }

    pub async fn resolve_source_id(&self, r: IdRef<'_>) -> Option<u32> {
        Self::resolve(&self.sources, r).await
    }

    pub async fn sources(&self) -> Vec<Source> {
        sorted_by_id(&self.sources.by_id.read().await, |s| s.id)
    }

    pub async fn source(&self, id: u32) -> Option<Source> {
        self.sources.by_id.read().await.get(&id).cloned()
    }

    // -- Destinations ------------------------------------------------------

    /// Upsert a destination's name. On first creation this also allocates
    /// its (initially empty) crosspoint sub-map.
    pub async fn upsert_destination_name(&self, id: u32, name: String) {
        let (old_name, created) = {
            let mut by_id = self.destinations.by_id.write().await;
            if let Some(existing) = by_id.get(&id) {
                let old_name = existing.name.clone();
                let mut updated = existing.clone();
                updated.name = name.clone();
                by_id.insert(id, updated);
                (Some(old_name), false)
            } else {
                by_id.insert(
                    id,
                    Destination {
                        id,
                        name: name.clone(),
                        levels: Vec::new(),
                    },
                );
                (None, true)
            }
        };
        {
            let mut by_name = self.destinations.by_name.write().await;
            if let Some(old_name) = old_name {
                by_name.remove(&old_name);
            }
            by_name.insert(name, id);
        }
        if created {
            self.crosspoints.write().await.entry(id).or_default();
        }
    }

    pub async fn extend_destination_levels(
        &self,
        id: u32,
        additions: impl IntoIterator<Item = u32>,
    ) {
        {
            let mut by_id = self.destinations.by_id.write().await;
            let entry = by_id.entry(id).or_insert_with(|| Destination {
                id,
                name: String::new(),
                levels: Vec::new(),
            });
            entry.extend_levels(additions);
        }
        self.crosspoints.write().await.entry(id).or_default();
    }

    pub async fn resolve_destination_id(&self, r: IdRef<'_>) -> Option<u32> {
        Self::resolve(&self.destinations, r).await
    }

    pub async fn destinations(&self) -> Vec<Destination> {
        sorted_by_id(&self.destinations.by_id.read().await, |d| d.id)
    }

    pub async fn destination(&self, id: u32) -> Option<Destination> {
        self.destinations.by_id.read().await.get(&id).cloned()
    }

    // -- Crosspoints -------------------------------------------------------

    /// Set a single destination-level's crosspoint, returning the resulting
    /// value so the dispatcher can hand it to the subscriber sink.
    pub async fn set_crosspoint(
        &self,
        dest_id: u32,
        dest_level: u32,
        src_id: u32,
        src_level: u32,
    ) -> Crosspoint {
        let crosspoint = Crosspoint {
            destination: dest_id,
            destination_level: dest_level,
            source: src_id,
            source_level: src_level,
            locked: false,
        };
        let mut table = self.crosspoints.write().await;
        let dest_map = table.entry(dest_id).or_default();
        let locked = dest_map.get(&dest_level).map(|c| c.locked).unwrap_or(false);
        let crosspoint = Crosspoint { locked, ..crosspoint };
        dest_map.insert(dest_level, crosspoint.clone());
        crosspoint
    }

    /// Project a lock flag onto every crosspoint currently stored for a
    /// destination, returning the updated crosspoints (order is the
    /// destination's declared level order is NOT guaranteed here — callers
    /// needing that order should iterate `destination.levels` themselves).
    pub async fn project_lock(&self, dest_id: u32, locked: bool) -> Vec<Crosspoint> {
        let mut table = self.crosspoints.write().await;
        let Some(dest_map) = table.get_mut(&dest_id) else {
            return Vec::new();
        };
        for crosspoint in dest_map.values_mut() {
            crosspoint.locked = locked;
        }
        dest_map.values().cloned().collect()
    }

    pub async fn crosspoints(&self) -> Vec<Crosspoint> {
        let table = self.crosspoints.read().await;
        let mut all: Vec<Crosspoint> = table.values().flat_map(|m| m.values().cloned()).collect();
        all.sort_unstable_by_key(|c| (c.destination, c.destination_level));
        all
    }

    pub async fn crosspoint(&self, dest_id: u32, dest_level: u32) -> Option<Crosspoint> {
        self.crosspoints
            .read()
            .await
            .get(&dest_id)
            .and_then(|m| m.get(&dest_level))
            .cloned()
    }
}
