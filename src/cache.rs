//! The resumable query cache.
//!
//! [`Cache`] is the aggregate the watch exchange reads and writes: stored
//! [`QueryRecord`]s keyed by [`QueryKey`], plus the [`DependencyIndex`] derived
//! from their responses. It contains no transport handles or callbacks, so it
//! can be serialized on one side of a process boundary and resumed on the
//! other.
//!
//! # Serialized form
//!
//! ```json
//! {
//!   "dependencies": { "Film:1": [17] },
//!   "queries": {
//!     "17": {
//!       "request": { "key": 17, "kind": "query", "query": "...", "variables": null,
//!                    "context": { "watch": true, "requestPolicy": "cache-first" } },
//!       "response": { "data": { "film": { "__typename": "Film", "id": "1" } },
//!                     "error": null, "extensions": null,
//!                     "hasNext": false, "stale": false },
//!       "trigger": 0
//!     }
//!   }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use watch_exchange::cache::Cache;
//! use watch_exchange::operation::Operation;
//!
//! let cache = Cache::new();
//! let trigger = cache.record_request(&Operation::query(1, "{ films { id } }").watched());
//!
//! assert_eq!(trigger.value(), 0);
//! assert!(cache.contains(1));
//! ```

mod dependencies;
mod record;
mod trigger;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use dependencies::DependencyIndex;
pub use record::{QueryRecord, ResponseSnapshot};
pub use trigger::Trigger;

use crate::operation::{Operation, OperationResult, QueryKey};
use crate::traverse::{self, ArrayTraversal, EntityKey};

/// Stored watched queries and the dependency index derived from them.
///
/// Shared by reference (usually `Arc<Cache>`) between the exchange and the
/// reactive layer. Both maps are concurrent, but every write is expected to
/// come from the pipeline that owns the session.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Cache {
    #[serde(default)]
    dependencies: DependencyIndex,
    #[serde(default)]
    queries: DashMap<QueryKey, QueryRecord>,
}

impl Cache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity -> dependent queries index.
    #[must_use]
    pub const fn dependencies(&self) -> &DependencyIndex {
        &self.dependencies
    }

    /// Copy of the record stored for `key`.
    #[must_use]
    pub fn query(&self, key: QueryKey) -> Option<QueryRecord> {
        self.queries.get(&key).map(|record| record.value().clone())
    }

    /// Copy of the last response stored for `key`.
    #[must_use]
    pub fn response(&self, key: QueryKey) -> Option<ResponseSnapshot> {
        self.queries.get(&key).map(|record| record.response.clone())
    }

    /// The trigger of the record stored for `key`.
    ///
    /// The returned handle shares its counter with the record.
    #[must_use]
    pub fn trigger(&self, key: QueryKey) -> Option<Trigger> {
        self.queries.get(&key).map(|record| record.trigger.clone())
    }

    #[must_use]
    pub fn contains(&self, key: QueryKey) -> bool {
        self.queries.contains_key(&key)
    }

    /// Number of stored queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Keys of every stored query, ascending.
    #[must_use]
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.queries.iter().map(|record| *record.key()).collect();
        keys.sort_unstable();
        keys
    }

    /// Stores the request snapshot of a watched operation.
    ///
    /// An existing record keeps its response and trigger; only its request is
    /// refreshed. A new record adopts the operation's trigger if it carries
    /// one, or starts a fresh one at `0`. Returns the record's trigger.
    pub fn record_request(&self, operation: &Operation) -> Trigger {
        let mut record = self.queries.entry(operation.key).or_insert_with(|| {
            let trigger = operation.context.trigger.clone().unwrap_or_default();
            QueryRecord::new(operation, trigger)
        });
        record.request = operation.snapshot();
        record.trigger.clone()
    }

    /// Overwrites the stored response for the result's key.
    ///
    /// Returns the record's trigger value, or `None` when the key has no
    /// record.
    pub fn store_response(&self, result: &OperationResult) -> Option<u64> {
        let mut record = self.queries.get_mut(&result.key())?;
        record.response.update(result);
        Some(record.trigger.value())
    }

    /// Increments the trigger of `key`, returning the new value.
    pub fn bump(&self, key: QueryKey) -> Option<u64> {
        self.queries.get(&key).map(|record| record.trigger.bump())
    }

    /// Records `key` as a dependent of every entity found in `data`.
    ///
    /// Within one call each entity gets `key` appended at most once.
    pub fn index(&self, key: QueryKey, data: &Value, arrays: ArrayTraversal) {
        let mut seen: Vec<EntityKey> = Vec::new();
        traverse::walk(data, arrays, &mut |entity| {
            if seen.contains(&entity) {
                return;
            }
            tracing::trace!(key, entity = %entity, "indexing dependency");
            self.dependencies.push(&entity, key);
            seen.push(entity);
        });
    }

    /// Clears the dependency index and rebuilds it from stored responses.
    ///
    /// Responses without data or carrying an error are skipped.
    pub fn rebuild_dependencies(&self, arrays: ArrayTraversal) {
        self.dependencies.clear();
        for key in self.keys() {
            let data = self.queries.get(&key).and_then(|record| {
                let response = &record.response;
                (response.error.is_none() && response.has_data())
                    .then(|| response.data.clone())
                    .flatten()
            });
            if let Some(data) = data {
                self.index(key, &data, arrays);
            }
        }
    }
}
