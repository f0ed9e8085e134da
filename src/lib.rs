//! # watch-exchange - Resumable Query Cache with Automatic Invalidation
//!
//! watch-exchange is a middleware stage ("exchange") for query pipelines. It
//! keeps watched queries resumable across a server-to-client handoff and
//! invalidates them automatically when newly-arrived data touches the
//! entities they depend on.
//!
//! ## Architecture
//!
//! 1. **Traverse**: Walks response payloads and finds entities (`__typename` + `id`)
//! 2. **Cache**: Stores watched queries and a reverse index from entity to query
//! 3. **Exchange**: Records watched requests, stores their responses, and bumps
//!    the trigger of every query that depends on fresh data
//! 4. **Client**: Runs operations through the exchange and a transport, and
//!    reissues watched queries when their trigger changes
//! 5. **Session**: Owns the cache for one client session and serializes it
//!    across the process boundary
//!
//! ## Core Components
//!
//! - [`WatchExchange`](exchange::WatchExchange): The pipeline stage
//! - [`Cache`](cache::Cache): Stored queries and dependency index
//! - [`Trigger`](cache::Trigger): Per-query invalidation counter
//! - [`Client`](client::Client): Executes and watches operations
//! - [`Session`](client::Session): Dehydrate and resume boundary
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use watch_exchange::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = Arc::new(MockTransport::new());
//! transport.respond(1, json!({ "film": { "__typename": "Film", "id": "1", "title": "Old" } }));
//! transport.respond(2, json!({ "editFilm": { "__typename": "Film", "id": "1", "title": "New" } }));
//!
//! let client = Client::new(Arc::new(Cache::new()), transport, ExchangeConfig::default());
//!
//! client.request(Operation::query(1, "{ film { id title } }").watched()).await;
//! client.request(Operation::mutation(2, "mutation { editFilm { id title } }")).await;
//!
//! // The mutation touched Film:1, so the watched query is now stale
//! assert_eq!(client.cache().trigger(1).map(|t| t.value()), Some(1));
//! # }
//! ```

pub mod cache;
pub mod client;
mod error;
pub mod exchange;
pub mod operation;
pub mod prelude;
pub mod traverse;

pub use error::ExchangeError;
