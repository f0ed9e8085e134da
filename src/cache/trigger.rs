use std::fmt;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A shared, observable invalidation counter.
///
/// Starts at `0` and only ever grows. Each increment means "the cached result
/// of this query is known to be stale". Clones share the same counter, so the
/// reference carried on an operation and the one stored in the cache record
/// stay in sync.
///
/// Serializes as a plain integer. A deserialized trigger keeps its value but
/// gets a fresh channel with no subscribers.
#[derive(Clone)]
pub struct Trigger {
    tx: Arc<watch::Sender<u64>>,
}

impl Trigger {
    /// Creates a trigger at `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_value(0)
    }

    /// Creates a trigger starting at `value`.
    #[must_use]
    pub fn with_value(value: u64) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    /// Current counter value.
    #[must_use]
    pub fn value(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Increments the counter by one, notifying every subscriber.
    ///
    /// Returns the new value.
    pub fn bump(&self) -> u64 {
        let mut value = 0;
        self.tx.send_modify(|counter| {
            *counter = counter.saturating_add(1);
            value = *counter;
        });
        value
    }

    /// Subscribes to counter changes.
    ///
    /// The current value is marked as seen; `changed()` resolves on the next
    /// bump.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Stream of counter values, starting with the current one.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, u64> {
        WatchStream::new(self.subscribe()).boxed()
    }

    /// Returns `true` if both handles point at the same counter.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Trigger").field(&self.value()).finish()
    }
}

impl Serialize for Trigger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value())
    }
}

impl<'de> Deserialize<'de> for Trigger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::with_value)
    }
}
