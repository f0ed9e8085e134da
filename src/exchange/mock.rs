//! Mock transport for testing.
//!
//! [`MockTransport`] answers operations from canned payloads instead of the
//! network, and records every operation it receives so tests can assert on
//! request policies and fetch counts.
//!
//! # Basic Usage
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use watch_exchange::exchange::mock::MockTransport;
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.respond(1, json!({ "film": { "__typename": "Film", "id": "1" } }));
//!
//! assert_eq!(transport.fetch_count(1), 0);
//! ```
//!
//! Responses can be replaced at any time, which is how tests simulate data
//! changing on the server between two fetches.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use super::Transport;
use crate::operation::{
    CacheOutcome, Operation, OperationError, OperationResult, QueryKey, RequestPolicy,
};

#[derive(Debug, Clone)]
enum Canned {
    Data(Value),
    Error(OperationError),
}

/// A transport that replies with canned responses.
///
/// Operations with no canned response resolve to a network error. When
/// [`with_transport_cache`](Self::with_transport_cache) is enabled, a
/// `cache-first` or `cache-only` operation for a key that was already fetched
/// is answered as a cache hit with the first payload it saw.
///
/// Cloning shares the canned responses and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<DashMap<QueryKey, Canned>>,
    transport_cache: Option<Arc<DashMap<QueryKey, Value>>>,
    requests: Arc<Mutex<Vec<Operation>>>,
}

impl MockTransport {
    /// Creates a transport with no canned responses and no transport cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables a simple transport-level cache keyed by query key.
    #[must_use]
    pub fn with_transport_cache(mut self) -> Self {
        self.transport_cache = Some(Arc::new(DashMap::new()));
        self
    }

    /// Sets the payload returned for `key`.
    pub fn respond(&self, key: QueryKey, data: Value) {
        self.responses.insert(key, Canned::Data(data));
    }

    /// Makes `key` fail with `error`.
    pub fn fail(&self, key: QueryKey, error: OperationError) {
        self.responses.insert(key, Canned::Error(error));
    }

    /// Every operation received so far, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if a thread panicked while holding the request log.
    #[must_use]
    pub fn requests(&self) -> Vec<Operation> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Number of operations received for `key`.
    ///
    /// # Panics
    ///
    /// Panics if the request log is poisoned.
    #[must_use]
    pub fn fetch_count(&self, key: QueryKey) -> usize {
        self.requests()
            .iter()
            .filter(|operation| operation.key == key)
            .count()
    }

    fn log(&self, operation: &Operation) {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(operation.clone());
    }

    fn resolve(&self, operation: Operation) -> OperationResult {
        self.log(&operation);

        let cacheable = matches!(
            operation.context.request_policy,
            RequestPolicy::CacheFirst | RequestPolicy::CacheOnly
        );
        if let Some(cache) = &self.transport_cache {
            if cacheable {
                if let Some(data) = cache.get(&operation.key).map(|data| data.value().clone()) {
                    return OperationResult::new(operation, data)
                        .with_cache_outcome(CacheOutcome::Hit);
                }
            }
        }

        let canned = self
            .responses
            .get(&operation.key)
            .map(|canned| canned.value().clone());
        match canned {
            Some(Canned::Data(data)) => {
                if let Some(cache) = &self.transport_cache {
                    cache.insert(operation.key, data.clone());
                }
                OperationResult::new(operation, data).with_cache_outcome(CacheOutcome::Miss)
            }
            Some(Canned::Error(error)) => OperationResult::from_error(operation, error),
            None => {
                let error = OperationError::network(format!("no response for key {}", operation.key));
                OperationResult::from_error(operation, error)
            }
        }
    }
}

impl Transport for MockTransport {
    fn fetch(&self, operation: Operation) -> BoxFuture<'static, OperationResult> {
        let result = self.resolve(operation);
        Box::pin(async move { result })
    }
}
