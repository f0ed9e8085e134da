use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::operation::QueryKey;
use crate::traverse::EntityKey;

/// Reverse index from entity identity to the queries whose results contained
/// it.
///
/// Keys are `Typename:id` strings. Each entry lists query keys in discovery
/// order. The same key may appear more than once when several responses
/// referenced the entity; readers deduplicate.
///
/// The index only answers "who to notify". It is never a source of truth for
/// entity data.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyIndex {
    entries: DashMap<String, Vec<QueryKey>>,
}

impl DependencyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `query` to the entry for `entity`, creating it if absent.
    pub fn push(&self, entity: &EntityKey, query: QueryKey) {
        self.entries
            .entry(entity.to_string())
            .or_default()
            .push(query);
    }

    /// Queries recorded against `entity`, in discovery order.
    #[must_use]
    pub fn dependents(&self, entity: &EntityKey) -> Vec<QueryKey> {
        self.entries
            .get(&entity.to_string())
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Returns `true` if some stored response referenced `entity`.
    #[must_use]
    pub fn contains(&self, entity: &EntityKey) -> bool {
        self.entries.contains_key(&entity.to_string())
    }

    /// Number of distinct entities in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Copy of every entry, sorted by entity key.
    #[must_use]
    pub fn to_sorted_vec(&self) -> Vec<(String, Vec<QueryKey>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
