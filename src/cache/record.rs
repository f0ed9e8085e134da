use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Trigger;
use crate::operation::{Operation, OperationError, OperationResult};

/// The last known response of a watched query.
///
/// Holds only what is needed to resume the query; the originating operation
/// is kept separately in [`QueryRecord::request`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub extensions: Option<Value>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub stale: bool,
}

impl ResponseSnapshot {
    /// Overwrites every field with the given result's.
    pub fn update(&mut self, result: &OperationResult) {
        self.data.clone_from(&result.data);
        self.error.clone_from(&result.error);
        self.extensions.clone_from(&result.extensions);
        self.has_next = result.has_next;
        self.stale = result.stale;
    }

    /// Returns `true` if a response has been stored with data.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.is_null())
    }

    /// Rebuilds a result for `operation` from this snapshot.
    #[must_use]
    pub fn to_result(&self, operation: Operation) -> OperationResult {
        OperationResult {
            operation,
            data: self.data.clone(),
            error: self.error.clone(),
            extensions: self.extensions.clone(),
            has_next: self.has_next,
            stale: self.stale,
        }
    }
}

/// Durable state of one watched query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    /// The request, without fetch handle or trigger reference.
    pub request: Operation,
    pub response: ResponseSnapshot,
    pub trigger: Trigger,
}

impl QueryRecord {
    /// Creates a record for `operation` with an empty response.
    #[must_use]
    pub fn new(operation: &Operation, trigger: Trigger) -> Self {
        Self {
            request: operation.snapshot(),
            response: ResponseSnapshot::default(),
            trigger,
        }
    }

    /// Returns `true` once the trigger has been bumped at least once.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.trigger.value() > 0
    }
}
