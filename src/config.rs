//! Orchestrator configuration
//!
//! Fixed at construction time, not runtime-mutable. The set of enabled
//! modalities is expressed by which capture sources and tracking engines the
//! composition layer injects; the configuration only carries cross-cutting
//! policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when a capture source fails during a global start cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Attempt every configured source regardless of earlier failures,
    /// aggregate all failure messages, keep partial successes running.
    #[default]
    Proceed,
    /// If any capture source fails, stop every source that did succeed and
    /// abort the start cycle before tracking engines are considered.
    Halt,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Proceed => write!(f, "proceed"),
            FailurePolicy::Halt => write!(f, "halt"),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Failure policy for the global start cycle
    pub failure_policy: FailurePolicy,
    /// How long an engine start may wait for video surface metadata before
    /// giving up. The wait is also bounded by the surface's own load/error
    /// events; the timeout covers surfaces that never settle either way.
    pub surface_ready_timeout_ms: u64,
}

impl OrchestratorConfig {
    /// Surface readiness timeout as a [`Duration`]
    pub fn surface_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.surface_ready_timeout_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Proceed,
            surface_ready_timeout_ms: 5000,
        }
    }
}
