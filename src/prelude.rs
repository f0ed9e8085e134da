//! Prelude module for convenient imports.
//!
//! ```
//! use watch_exchange::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Cache`] and [`Trigger`] - Stored queries and their invalidation counters
//! - [`WatchExchange`] and [`ExchangeConfig`] - The pipeline stage
//! - [`Exchange`] and [`Transport`] - Pipeline seams
//! - [`Client`] and [`Session`] - Executing, watching and resuming queries
//! - [`Operation`] and [`OperationResult`] - Requests and responses
//! - [`MockTransport`] - Canned responses for tests

pub use crate::cache::{Cache, Trigger};
pub use crate::client::{Client, ClientFactory, Session};
pub use crate::error::ExchangeError;
pub use crate::exchange::mock::MockTransport;
pub use crate::exchange::{Exchange, ExchangeConfig, Transport, WatchExchange};
pub use crate::operation::{
    CacheOutcome, Operation, OperationError, OperationResult, QueryKey, RequestPolicy,
};
pub use crate::traverse::{ArrayTraversal, EntityKey};
