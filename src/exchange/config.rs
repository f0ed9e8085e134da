use serde::{Deserialize, Serialize};

use crate::operation::RequestPolicy;
use crate::traverse::ArrayTraversal;

/// Configuration for the watch exchange.
///
/// Controls how invalidated queries are refetched and how payloads are
/// walked when building and reading the dependency index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExchangeConfig {
    /// Policy forced onto a watched request whose trigger is above zero.
    ///
    /// A positive trigger proves the cached data is stale, so the reissued
    /// request should not be answered from a transport cache.
    pub refetch_policy: RequestPolicy,

    /// How arrays in response payloads are walked.
    pub array_traversal: ArrayTraversal,

    /// Whether a resumed session rebuilds its dependency index from the
    /// stored responses instead of trusting the serialized one.
    pub rebuild_dependencies_on_resume: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            refetch_policy: RequestPolicy::NetworkOnly,
            array_traversal: ArrayTraversal::FirstElement,
            rebuild_dependencies_on_resume: true,
        }
    }
}

impl ExchangeConfig {
    /// Creates a configuration with the given refetch policy and array traversal.
    #[must_use]
    pub const fn new(refetch_policy: RequestPolicy, array_traversal: ArrayTraversal) -> Self {
        Self {
            refetch_policy,
            array_traversal,
            rebuild_dependencies_on_resume: true,
        }
    }

    #[must_use]
    pub const fn with_refetch_policy(mut self, policy: RequestPolicy) -> Self {
        self.refetch_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_array_traversal(mut self, arrays: ArrayTraversal) -> Self {
        self.array_traversal = arrays;
        self
    }

    #[must_use]
    pub const fn with_rebuild_on_resume(mut self, rebuild: bool) -> Self {
        self.rebuild_dependencies_on_resume = rebuild;
        self
    }
}
