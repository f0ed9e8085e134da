//! Operations and results flowing through the exchange pipeline.
//!
//! These types are the boundary contract with the transport: an [`Operation`]
//! goes out, an [`OperationResult`] comes back. Everything except the fetch
//! handle and the live trigger reference is serializable, so an operation can
//! be stored as a request snapshot and resumed in another process.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::Trigger;

/// Stable identifier of an operation, shared by its request and its results.
pub type QueryKey = u64;

/// Handle used by the transport to abort an in-flight fetch.
///
/// Never persisted: it is stripped from every snapshot.
pub type FetchHandle = CancellationToken;

/// The kind of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
    Teardown,
}

/// How the transport should use its own cache for an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestPolicy {
    /// Serve from the transport cache when possible, otherwise fetch.
    #[default]
    CacheFirst,
    /// Only ever serve from the transport cache.
    CacheOnly,
    /// Always fetch, bypassing the transport cache.
    NetworkOnly,
    /// Serve cached data and fetch in the background.
    CacheAndNetwork,
}

/// Whether a result was served by a lower-level transport cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Miss,
    Partial,
    Hit,
}

/// Metadata attached to an operation by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_outcome: Option<CacheOutcome>,
}

/// Per-operation context bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    /// Marks the operation as watched: cached, resumable and kept fresh.
    #[serde(default)]
    pub watch: bool,

    #[serde(default)]
    pub request_policy: RequestPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<OperationMeta>,

    /// Live reference to the query's trigger counter.
    ///
    /// The stored record owns the canonical trigger, so this is never
    /// serialized with a snapshot.
    #[serde(skip)]
    pub trigger: Option<Trigger>,

    #[serde(skip)]
    pub fetch: Option<FetchHandle>,

    /// Any other serializable context.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OperationContext {
    /// Returns `true` if the transport reported a cache hit.
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        self.meta
            .as_ref()
            .and_then(|meta| meta.cache_outcome)
            .is_some_and(|outcome| outcome == CacheOutcome::Hit)
    }

    /// Current trigger value, `0` when no trigger is attached.
    #[must_use]
    pub fn trigger_value(&self) -> u64 {
        self.trigger.as_ref().map_or(0, Trigger::value)
    }
}

/// An outgoing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    pub key: QueryKey,
    #[serde(default)]
    pub kind: OperationKind,
    pub query: String,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub context: OperationContext,
}

impl Operation {
    /// Creates a query operation with empty variables and default context.
    pub fn query(key: QueryKey, query: impl Into<String>) -> Self {
        Self {
            key,
            kind: OperationKind::Query,
            query: query.into(),
            variables: Value::Null,
            context: OperationContext::default(),
        }
    }

    /// Creates a mutation operation with empty variables and default context.
    pub fn mutation(key: QueryKey, query: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            ..Self::query(key, query)
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Marks the operation as watched.
    #[must_use]
    pub const fn watched(mut self) -> Self {
        self.context.watch = true;
        self
    }

    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchHandle) -> Self {
        self.context.fetch = Some(fetch);
        self
    }

    /// Copy of this operation that is safe to persist.
    ///
    /// The fetch handle and the live trigger reference are dropped.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.context.fetch = None;
        snapshot.context.trigger = None;
        snapshot
    }
}

/// Application-level error carried by a result.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graphql_errors: Vec<Value>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            network_error: None,
            graphql_errors: Vec::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            network_error: Some(message.clone()),
            message: format!("[Network] {message}"),
            graphql_errors: Vec::new(),
        }
    }
}

/// A response for an [`Operation`].
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub operation: Operation,
    pub data: Option<Value>,
    pub error: Option<OperationError>,
    pub extensions: Option<Value>,
    pub has_next: bool,
    pub stale: bool,
}

impl OperationResult {
    /// Creates a successful result carrying `data`.
    #[must_use]
    pub const fn new(operation: Operation, data: Value) -> Self {
        Self {
            operation,
            data: Some(data),
            error: None,
            extensions: None,
            has_next: false,
            stale: false,
        }
    }

    /// Creates a result carrying only an error.
    #[must_use]
    pub const fn from_error(operation: Operation, error: OperationError) -> Self {
        Self {
            operation,
            data: None,
            error: Some(error),
            extensions: None,
            has_next: false,
            stale: false,
        }
    }

    /// Key of the originating operation.
    #[must_use]
    pub const fn key(&self) -> QueryKey {
        self.operation.key
    }

    /// Payload data, treating JSON `null` as absent.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref().filter(|data| !data.is_null())
    }

    /// Returns `true` if the transport served this result from its cache.
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        self.operation.context.is_cache_hit()
    }

    /// Tags the originating operation with a cache outcome.
    #[must_use]
    pub fn with_cache_outcome(mut self, outcome: CacheOutcome) -> Self {
        self.operation
            .context
            .meta
            .get_or_insert_with(OperationMeta::default)
            .cache_outcome = Some(outcome);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_strips_live_handles() {
        let mut op = Operation::query(1, "{ films { id } }")
            .watched()
            .with_fetch(CancellationToken::new());
        op.context.trigger = Some(Trigger::new());

        let snapshot = op.snapshot();
        assert!(snapshot.context.fetch.is_none());
        assert!(snapshot.context.trigger.is_none());
        assert!(snapshot.context.watch);

        // The operation itself keeps its handles
        assert!(op.context.fetch.is_some());
        assert!(op.context.trigger.is_some());
    }

    #[test]
    fn test_context_serialization_skips_handles() {
        let mut op = Operation::query(7, "{ a }")
            .watched()
            .with_fetch(CancellationToken::new());
        op.context.trigger = Some(Trigger::with_value(3));
        op.context.url = Some("/graphql".to_string());
        op.context.extra.insert("requestId".to_string(), json!("abc"));

        let value = serde_json::to_value(&op).expect("operation should serialize");
        assert_eq!(
            value["context"],
            json!({
                "watch": true,
                "requestPolicy": "cache-first",
                "url": "/graphql",
                "requestId": "abc"
            })
        );

        let restored: Operation = serde_json::from_value(value).expect("should deserialize");
        assert!(restored.context.fetch.is_none());
        assert!(restored.context.trigger.is_none());
        assert_eq!(restored.context.url.as_deref(), Some("/graphql"));
        assert_eq!(restored.context.extra.get("requestId"), Some(&json!("abc")));
    }

    #[test]
    fn test_is_cache_hit() {
        let op = Operation::query(1, "{ a }");
        let result = OperationResult::new(op.clone(), json!({}));
        assert!(!result.is_cache_hit());

        let hit = OperationResult::new(op.clone(), json!({})).with_cache_outcome(CacheOutcome::Hit);
        assert!(hit.is_cache_hit());

        let miss = OperationResult::new(op, json!({})).with_cache_outcome(CacheOutcome::Miss);
        assert!(!miss.is_cache_hit());
    }

    #[test]
    fn test_null_data_is_absent() {
        let result = OperationResult::new(Operation::query(1, "{ a }"), Value::Null);
        assert!(result.data().is_none());

        let result = OperationResult::new(Operation::query(1, "{ a }"), json!({ "a": 1 }));
        assert_eq!(result.data(), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new("Film not found");
        assert_eq!(err.to_string(), "Film not found");

        let err = OperationError::network("connection reset");
        assert_eq!(err.to_string(), "[Network] connection reset");
        assert_eq!(err.network_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_policy_wire_names() {
        assert_eq!(
            serde_json::to_value(RequestPolicy::NetworkOnly).expect("serialize"),
            json!("network-only")
        );
        assert_eq!(
            serde_json::to_value(CacheOutcome::Hit).expect("serialize"),
            json!("hit")
        );
        assert_eq!(
            serde_json::to_value(CacheOutcome::Partial).expect("serialize"),
            json!("partial")
        );
    }

    #[test]
    fn test_kind_wire_names() {
        for (kind, name) in [
            (OperationKind::Query, "query"),
            (OperationKind::Mutation, "mutation"),
            (OperationKind::Subscription, "subscription"),
            (OperationKind::Teardown, "teardown"),
        ] {
            assert_eq!(serde_json::to_value(kind).expect("serialize"), json!(name));
        }
    }
}
