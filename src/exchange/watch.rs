//! The watch exchange: resumable watched queries with automatic invalidation.
//!
//! # Request side
//!
//! A watched operation (`context.watch == true`) is recorded into the
//! [`Cache`] before it is forwarded, so the query can be resumed later
//! without a network round trip. If the query's trigger is already above
//! zero, its cached data is known to be stale and the request policy is
//! overridden with [`ExchangeConfig::refetch_policy`].
//!
//! # Response side
//!
//! Every result that carries data and was not served from a transport cache
//! invalidates the watched queries that depend on the entities it contains:
//! each dependent's trigger is bumped once. The result's own query is never
//! bumped by its own data. Results for stored queries then overwrite the
//! stored response and, while the query is still clean, extend the
//! dependency index.
//!
//! Observing triggers and reissuing requests is left to the caller, see
//! [`Client::watch_query`](crate::client::Client::watch_query).

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use super::{Exchange, ExchangeConfig, Forward, OperationStream, ResultStream};
use crate::cache::Cache;
use crate::operation::{Operation, OperationResult, QueryKey};
use crate::traverse;

/// Pipeline stage that records watched queries and invalidates dependents.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use watch_exchange::cache::Cache;
/// use watch_exchange::exchange::{ExchangeConfig, WatchExchange};
/// use watch_exchange::operation::{Operation, OperationResult};
///
/// let cache = Arc::new(Cache::new());
/// let exchange = WatchExchange::new(cache.clone(), ExchangeConfig::default());
///
/// // A watched query sees Film:1
/// let query = exchange.process_request(Operation::query(1, "{ film { id } }").watched());
/// let mut result = OperationResult::new(query, json!({ "__typename": "Film", "id": "1" }));
/// exchange.process_response(&mut result);
///
/// // A mutation returns Film:1 again
/// let mutation = exchange.process_request(Operation::mutation(2, "mutation { rename }"));
/// let mut result = OperationResult::new(mutation, json!({ "__typename": "Film", "id": "1" }));
/// exchange.process_response(&mut result);
///
/// assert_eq!(cache.trigger(1).map(|t| t.value()), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct WatchExchange {
    cache: Arc<Cache>,
    config: ExchangeConfig,
}

impl WatchExchange {
    /// Creates the stage over a shared cache.
    #[must_use]
    pub const fn new(cache: Arc<Cache>, config: ExchangeConfig) -> Self {
        Self { cache, config }
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Records a watched operation and decides its request policy.
    ///
    /// The returned operation carries the record's trigger.
    #[must_use]
    pub fn process_request(&self, mut operation: Operation) -> Operation {
        if !operation.context.watch {
            return operation;
        }

        let trigger = self.cache.record_request(&operation);
        tracing::debug!(key = operation.key, trigger = trigger.value(), "recorded watched request");

        if trigger.value() > 0 {
            tracing::debug!(
                key = operation.key,
                from = ?operation.context.request_policy,
                to = ?self.config.refetch_policy,
                "overriding request policy for invalidated query"
            );
            operation.context.request_policy = self.config.refetch_policy;
        }

        operation.context.trigger = Some(trigger);
        operation
    }

    /// Stores the result of a watched query and invalidates dependents.
    ///
    /// The fetch handle is removed from the result's operation when the query
    /// is stored.
    pub fn process_response(&self, result: &mut OperationResult) {
        let key = result.key();
        let fresh = !result.is_cache_hit();

        if let Some(data) = result.data().filter(|_| fresh) {
            self.trigger_dependencies(data, key);
        }

        if !self.cache.contains(key) {
            return;
        }

        result.operation.context.fetch = None;
        let Some(trigger) = self.cache.store_response(result) else {
            return;
        };

        if trigger > 0 || result.error.is_some() {
            return;
        }
        if let Some(data) = result.data().filter(|_| fresh) {
            self.set_dependencies(key, data);
        }
    }

    /// Adds `key` as a dependent of every entity in `data`.
    pub fn set_dependencies(&self, key: QueryKey, data: &Value) {
        self.cache.index(key, data, self.config.array_traversal);
    }

    /// Bumps the trigger of every query depending on an entity in `data`.
    ///
    /// `origin` is the query that produced `data`; it is never bumped. Each
    /// other query is bumped at most once per call, no matter how many of its
    /// entities `data` contains. Returns the bumped keys in discovery order.
    pub fn trigger_dependencies(&self, data: &Value, origin: QueryKey) -> Vec<QueryKey> {
        let mut hits = HashSet::from([origin]);
        let mut triggered = Vec::new();

        traverse::walk(data, self.config.array_traversal, &mut |entity| {
            for dependent in self.cache.dependencies().dependents(&entity) {
                if !hits.insert(dependent) {
                    continue;
                }
                // Index entries can outlive a record on a resumed cache
                if let Some(value) = self.cache.bump(dependent) {
                    tracing::trace!(key = dependent, entity = %entity, value, "triggered dependent");
                    triggered.push(dependent);
                }
            }
        });

        if !triggered.is_empty() {
            tracing::debug!(origin, count = triggered.len(), "invalidated dependent queries");
        }
        triggered
    }
}

impl Exchange for WatchExchange {
    fn run(self: Arc<Self>, operations: OperationStream, forward: Forward) -> ResultStream {
        let stage = self.clone();
        let operations = operations
            .map(move |operation| stage.process_request(operation))
            .boxed();

        forward(operations)
            .map(move |mut result| {
                self.process_response(&mut result);
                result
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CacheOutcome, OperationError, OperationKind, RequestPolicy};
    use crate::traverse::{ArrayTraversal, EntityKey};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn exchange() -> WatchExchange {
        WatchExchange::new(Arc::new(Cache::new()), ExchangeConfig::default())
    }

    fn film(id: &str, title: &str) -> Value {
        json!({ "film": { "__typename": "Film", "id": id, "title": title } })
    }

    /// Runs a watched query through both sides of the stage.
    fn resolve_watched(exchange: &WatchExchange, key: QueryKey, data: Value) -> OperationResult {
        let op = exchange.process_request(Operation::query(key, "query").watched());
        let mut result = OperationResult::new(op, data);
        exchange.process_response(&mut result);
        result
    }

    fn trigger_value(exchange: &WatchExchange, key: QueryKey) -> Option<u64> {
        exchange.cache().trigger(key).map(|trigger| trigger.value())
    }

    #[test]
    fn test_unwatched_request_passes_through() {
        let exchange = exchange();
        let op = exchange.process_request(Operation::query(1, "{ a }"));

        assert!(op.context.trigger.is_none());
        assert_eq!(op.context.request_policy, RequestPolicy::CacheFirst);
        assert!(exchange.cache().is_empty());
    }

    #[test]
    fn test_watched_request_is_recorded() {
        let exchange = exchange();
        let op = Operation::query(1, "{ a }")
            .watched()
            .with_fetch(CancellationToken::new());
        let op = exchange.process_request(op);

        let record = exchange.cache().query(1).expect("record should exist");
        assert!(record.request.context.fetch.is_none());
        assert!(op.context.fetch.is_some(), "outgoing operation keeps its fetch handle");
        assert!(
            op.context
                .trigger
                .as_ref()
                .is_some_and(|trigger| trigger.same_as(&record.trigger))
        );
        assert_eq!(op.context.request_policy, RequestPolicy::CacheFirst);
    }

    #[test]
    fn test_triggered_request_overrides_policy() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));
        exchange.cache().bump(1);

        let op = exchange.process_request(Operation::query(1, "query").watched());
        assert_eq!(op.context.request_policy, RequestPolicy::NetworkOnly);

        // The stored snapshot keeps the policy it was issued with
        let record = exchange.cache().query(1).expect("record should exist");
        assert_eq!(record.request.context.request_policy, RequestPolicy::CacheFirst);
    }

    #[test]
    fn test_configured_refetch_policy() {
        let config = ExchangeConfig::default().with_refetch_policy(RequestPolicy::CacheAndNetwork);
        let exchange = WatchExchange::new(Arc::new(Cache::new()), config);
        resolve_watched(&exchange, 1, film("1", "Old"));
        exchange.cache().bump(1);

        let op = exchange.process_request(Operation::query(1, "query").watched());
        assert_eq!(op.context.request_policy, RequestPolicy::CacheAndNetwork);
    }

    #[test]
    fn test_response_is_stored_and_indexed() {
        let exchange = exchange();
        let result = resolve_watched(&exchange, 1, film("1", "Old"));

        let response = exchange.cache().response(1).expect("response should be stored");
        assert_eq!(response.data, result.data);
        assert_eq!(
            exchange
                .cache()
                .dependencies()
                .dependents(&EntityKey::new("Film", "1")),
            vec![1]
        );
    }

    #[test]
    fn test_partial_cache_outcome_is_fresh() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));

        let op = exchange.process_request(Operation::query(2, "query").watched());
        let mut result =
            OperationResult::new(op, film("1", "New")).with_cache_outcome(CacheOutcome::Partial);
        exchange.process_response(&mut result);

        assert_eq!(trigger_value(&exchange, 1), Some(1));
        assert_eq!(
            exchange
                .cache()
                .dependencies()
                .dependents(&EntityKey::new("Film", "1")),
            vec![1, 2]
        );
    }

    #[test]
    fn test_subscription_result_invalidates() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));

        let op = Operation {
            kind: OperationKind::Subscription,
            ..Operation::query(5, "subscription { filmChanged }")
        };
        let mut result = OperationResult::new(exchange.process_request(op), film("1", "New"));
        exchange.process_response(&mut result);

        assert_eq!(trigger_value(&exchange, 1), Some(1));
        assert!(!exchange.cache().contains(5));
    }

    #[test]
    fn test_teardown_is_not_recorded() {
        let exchange = exchange();
        let op = Operation {
            kind: OperationKind::Teardown,
            ..Operation::query(1, "{ a }")
        };
        let op = exchange.process_request(op);

        assert_eq!(op.kind, OperationKind::Teardown);
        assert!(exchange.cache().is_empty());
    }

    #[test]
    fn test_response_strips_fetch_handle() {
        let exchange = exchange();
        let op = exchange.process_request(
            Operation::query(1, "query")
                .watched()
                .with_fetch(CancellationToken::new()),
        );
        let mut result = OperationResult::new(op, film("1", "Old"));
        exchange.process_response(&mut result);

        assert!(result.operation.context.fetch.is_none());
    }

    #[test]
    fn test_mutation_invalidates_dependent_query() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));

        let mutation = exchange.process_request(Operation::mutation(2, "mutation"));
        let mut result =
            OperationResult::new(mutation, film("1", "New")).with_cache_outcome(CacheOutcome::Miss);
        exchange.process_response(&mut result);

        assert_eq!(trigger_value(&exchange, 1), Some(1));
        assert!(!exchange.cache().contains(2));
    }

    #[test]
    fn test_no_self_trigger() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));
        resolve_watched(&exchange, 1, film("1", "Old"));

        assert_eq!(trigger_value(&exchange, 1), Some(0));
    }

    #[test]
    fn test_at_most_one_bump_per_pass() {
        let exchange = exchange();
        resolve_watched(
            &exchange,
            1,
            json!({
                "film": { "__typename": "Film", "id": "1" },
                "planet": { "__typename": "Planet", "id": "3" }
            }),
        );

        let data = json!({
            "a": { "__typename": "Film", "id": "1" },
            "b": { "__typename": "Planet", "id": "3" },
            "c": { "__typename": "Film", "id": "1" }
        });
        let triggered = exchange.trigger_dependencies(&data, 2);

        assert_eq!(triggered, vec![1]);
        assert_eq!(trigger_value(&exchange, 1), Some(1));
    }

    #[test]
    fn test_cache_hit_suppresses_indexing_and_invalidation() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));

        let op = exchange.process_request(Operation::query(2, "query").watched());
        let mut result =
            OperationResult::new(op, film("1", "Old")).with_cache_outcome(CacheOutcome::Hit);
        exchange.process_response(&mut result);

        assert_eq!(trigger_value(&exchange, 1), Some(0));
        assert_eq!(
            exchange
                .cache()
                .dependencies()
                .dependents(&EntityKey::new("Film", "1")),
            vec![1]
        );
        // The hit is still stored
        assert_eq!(
            exchange.cache().response(2).and_then(|r| r.data),
            Some(film("1", "Old"))
        );
    }

    #[test]
    fn test_unwatched_response_still_invalidates() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("2", "Old"));

        let op = exchange.process_request(Operation::query(5, "query"));
        let mut result = OperationResult::new(op, json!({ "__typename": "Film", "id": "2" }));
        exchange.process_response(&mut result);

        assert_eq!(trigger_value(&exchange, 1), Some(1));
        assert!(!exchange.cache().contains(5));
    }

    #[test]
    fn test_error_response_is_stored_but_not_indexed() {
        let exchange = exchange();
        let op = exchange.process_request(Operation::query(1, "query").watched());
        let mut result = OperationResult::new(op, film("1", "Old"));
        result.error = Some(OperationError::new("partial"));
        exchange.process_response(&mut result);

        let response = exchange.cache().response(1).expect("response should be stored");
        assert_eq!(response.error, Some(OperationError::new("partial")));
        assert_eq!(response.data, Some(film("1", "Old")));
        assert!(exchange.cache().dependencies().is_empty());
    }

    #[test]
    fn test_error_only_response() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));

        let op = exchange.process_request(Operation::query(1, "query").watched());
        let mut result = OperationResult::from_error(op, OperationError::network("offline"));
        exchange.process_response(&mut result);

        let response = exchange.cache().response(1).expect("response should be stored");
        assert!(response.data.is_none());
        assert!(response.error.is_some());
    }

    #[test]
    fn test_triggered_query_is_not_reindexed() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("1", "Old"));
        exchange.cache().bump(1);

        // Refetch after invalidation brings a new entity
        resolve_watched(
            &exchange,
            1,
            json!({ "film": { "__typename": "Film", "id": "1" }, "extra": { "__typename": "Film", "id": "9" } }),
        );

        let index = exchange.cache().dependencies();
        assert_eq!(index.dependents(&EntityKey::new("Film", "1")), vec![1]);
        assert!(!index.contains(&EntityKey::new("Film", "9")));
        // Stored response is still refreshed
        assert_eq!(
            exchange
                .cache()
                .response(1)
                .and_then(|r| r.data)
                .map(|data| data["extra"]["id"].clone()),
            Some(json!("9"))
        );
    }

    #[test]
    fn test_index_entry_without_record_is_skipped() {
        let exchange = exchange();
        exchange
            .cache()
            .dependencies()
            .push(&EntityKey::new("Film", "1"), 42);
        resolve_watched(&exchange, 1, film("1", "Old"));

        let triggered = exchange.trigger_dependencies(&film("1", "New"), 2);
        assert_eq!(triggered, vec![1]);
    }

    #[test]
    fn test_first_element_traversal_limits_invalidation() {
        let exchange = exchange();
        resolve_watched(&exchange, 1, film("2", "Old"));

        let list = json!({ "films": [
            { "__typename": "Film", "id": "1" },
            { "__typename": "Film", "id": "2" }
        ]});
        assert!(exchange.trigger_dependencies(&list, 2).is_empty());

        let all = WatchExchange::new(
            exchange.cache().clone(),
            ExchangeConfig::default().with_array_traversal(ArrayTraversal::AllElements),
        );
        assert_eq!(all.trigger_dependencies(&list, 2), vec![1]);
    }

    #[tokio::test]
    async fn test_run_wires_both_sides() {
        use crate::exchange::{compose, forward_to};
        use crate::exchange::mock::MockTransport;
        use futures::stream;

        let transport = Arc::new(MockTransport::new());
        transport.respond(1, film("1", "Old"));
        transport.respond(2, film("1", "New"));

        let exchange = Arc::new(exchange());
        let pipeline = compose(exchange.clone(), forward_to(transport.clone()));

        let operations = stream::iter(vec![
            Operation::query(1, "query").watched(),
            Operation::mutation(2, "mutation"),
        ])
        .boxed();
        let results: Vec<_> = pipeline(operations).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(trigger_value(&exchange, 1), Some(1));
        assert_eq!(transport.requests().len(), 2);
    }
}
