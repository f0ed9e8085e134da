//! Client handle and session boundary.
//!
//! A [`Session`] owns the [`Cache`] for one client session. It is created
//! fresh on the side that first runs queries, dehydrated to JSON, and resumed
//! on the other side with [`Session::resume`]. Each session hands out a single
//! [`Client`], built on first use by a [`ClientFactory`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use watch_exchange::cache::Cache;
//! use watch_exchange::client::{Client, Session};
//! use watch_exchange::exchange::ExchangeConfig;
//! use watch_exchange::exchange::mock::MockTransport;
//! use watch_exchange::operation::Operation;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), watch_exchange::ExchangeError> {
//! let transport = Arc::new(MockTransport::new());
//! transport.respond(1, json!({ "film": { "__typename": "Film", "id": "1" } }));
//!
//! // Server side: run a watched query, then dehydrate
//! let server = Session::default();
//! let client = server.get_client(&|cache: Arc<Cache>, config: ExchangeConfig| {
//!     Some(Client::new(cache, transport.clone(), config))
//! })?;
//! client.request(Operation::query(1, "{ film { id } }").watched()).await;
//! let state = server.dehydrate()?;
//!
//! // Client side: resume without refetching
//! let resumed = Session::resume(&state, Default::default())?;
//! assert!(resumed.cache().contains(1));
//! # Ok(())
//! # }
//! ```

pub mod query;

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::{StreamExt, future, stream};

use crate::cache::Cache;
use crate::error::ExchangeError;
use crate::exchange::{
    ExchangeConfig, Forward, ResultStream, Transport, WatchExchange, compose, forward_to,
};
use crate::operation::{Operation, OperationResult};

/// Handle for running operations through the watch exchange and a transport.
///
/// Cheap to clone; clones share the same cache and pipeline.
#[derive(Clone)]
pub struct Client {
    exchange: Arc<WatchExchange>,
    pipeline: Forward,
}

impl Client {
    /// Builds a client whose pipeline is the watch exchange in front of
    /// `transport`.
    pub fn new<T: Transport>(cache: Arc<Cache>, transport: Arc<T>, config: ExchangeConfig) -> Self {
        let exchange = Arc::new(WatchExchange::new(cache, config));
        let pipeline = compose(exchange.clone(), forward_to(transport));
        Self { exchange, pipeline }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        self.exchange.cache()
    }

    #[must_use]
    pub fn exchange(&self) -> &WatchExchange {
        &self.exchange
    }

    /// Runs one operation through the pipeline.
    #[must_use]
    pub fn execute(&self, operation: Operation) -> ResultStream {
        (self.pipeline)(stream::once(future::ready(operation)).boxed())
    }

    /// Runs one operation and returns its first result.
    pub async fn request(&self, operation: Operation) -> Option<OperationResult> {
        self.execute(operation).next().await
    }

    /// Watches `operation`, re-executing it every time its trigger changes.
    ///
    /// The operation is marked as watched and recorded right away, so every
    /// stream for the same key follows the same trigger. See [`query`] for the
    /// full behavior.
    #[must_use]
    pub fn watch_query(&self, operation: Operation) -> ResultStream {
        query::watch_query(self.clone(), operation)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

/// Builds the client for a session.
///
/// Returning `None` means no client can be provided; the session reports it
/// as [`ExchangeError::ClientUnavailable`].
pub trait ClientFactory {
    fn create(&self, cache: Arc<Cache>, config: ExchangeConfig) -> Option<Client>;
}

impl<F> ClientFactory for F
where
    F: Fn(Arc<Cache>, ExchangeConfig) -> Option<Client>,
{
    fn create(&self, cache: Arc<Cache>, config: ExchangeConfig) -> Option<Client> {
        self(cache, config)
    }
}

/// Cache and client for one client session.
#[derive(Debug, Default)]
pub struct Session {
    cache: Arc<Cache>,
    config: ExchangeConfig,
    client: OnceLock<Client>,
}

impl Session {
    /// Starts a session with an empty cache.
    #[must_use]
    pub fn new(config: ExchangeConfig) -> Self {
        Self::from_cache(Arc::new(Cache::new()), config)
    }

    /// Starts a session over an existing cache.
    #[must_use]
    pub fn from_cache(cache: Arc<Cache>, config: ExchangeConfig) -> Self {
        Self {
            cache,
            config,
            client: OnceLock::new(),
        }
    }

    /// Resumes a session from a dehydrated cache.
    ///
    /// When [`ExchangeConfig::rebuild_dependencies_on_resume`] is set, the
    /// dependency index is rebuilt from the stored responses.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Serialization`] if `state` is not a valid
    /// serialized cache.
    pub fn resume(state: &str, config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let cache: Cache = serde_json::from_str(state)?;
        if config.rebuild_dependencies_on_resume {
            cache.rebuild_dependencies(config.array_traversal);
        }
        tracing::debug!(
            queries = cache.len(),
            dependencies = cache.dependencies().len(),
            "resumed session cache"
        );
        Ok(Self::from_cache(Arc::new(cache), config))
    }

    /// Serializes the cache for resuming elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Serialization`] if the cache holds a value
    /// JSON cannot represent.
    pub fn dehydrate(&self) -> Result<String, ExchangeError> {
        Ok(serde_json::to_string(self.cache.as_ref())?)
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    #[must_use]
    pub const fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Returns the session's client, creating it with `factory` on first use.
    ///
    /// Later calls reuse the same client and ignore `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::ClientUnavailable`] if the factory produces
    /// no client.
    pub fn get_client<F: ClientFactory>(&self, factory: &F) -> Result<Client, ExchangeError> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        let client = factory
            .create(self.cache.clone(), self.config)
            .ok_or(ExchangeError::ClientUnavailable)?;
        Ok(self.client.get_or_init(|| client).clone())
    }
}
