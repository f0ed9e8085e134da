//! Pipeline stages ("exchanges") and the transport seam.
//!
//! An exchange sees the stream of outgoing operations before it is forwarded
//! and the stream of results after the next stage resolves them. The last
//! stage is a [`Transport`], which turns one operation into one result.
//!
//! ```text
//! operations ─▶ WatchExchange::process_request ─▶ forward ─▶ transport
//!                                                               │
//! results    ◀─ WatchExchange::process_response ◀───────────────┘
//! ```

mod config;
pub mod mock;
pub mod watch;

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

pub use config::ExchangeConfig;
pub use watch::WatchExchange;

use crate::operation::{Operation, OperationResult};

/// Stream of outgoing operations.
pub type OperationStream = BoxStream<'static, Operation>;

/// Stream of incoming results.
pub type ResultStream = BoxStream<'static, OperationResult>;

/// The rest of the pipeline, as seen from one exchange.
pub type Forward = Arc<dyn Fn(OperationStream) -> ResultStream + Send + Sync>;

/// A middleware stage in the operation pipeline.
pub trait Exchange: Send + Sync + 'static {
    /// Wires this stage in front of `forward`.
    fn run(self: Arc<Self>, operations: OperationStream, forward: Forward) -> ResultStream;
}

/// The terminal stage that actually resolves operations.
///
/// Network I/O lives behind this trait and is not provided by this crate
/// beyond [`mock::MockTransport`].
pub trait Transport: Send + Sync + 'static {
    fn fetch(&self, operation: Operation) -> BoxFuture<'static, OperationResult>;
}

/// Adapts a transport into a [`Forward`] that resolves operations in order.
pub fn forward_to<T: Transport>(transport: Arc<T>) -> Forward {
    Arc::new(move |operations: OperationStream| {
        let transport = transport.clone();
        operations
            .then(move |operation| transport.fetch(operation))
            .boxed()
    })
}

/// Composes `exchange` in front of `forward`, producing a new [`Forward`].
pub fn compose<E: Exchange>(exchange: Arc<E>, forward: Forward) -> Forward {
    Arc::new(move |operations: OperationStream| exchange.clone().run(operations, forward.clone()))
}
