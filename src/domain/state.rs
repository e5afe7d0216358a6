//! Runtime service instance state machine
//!
//! `PENDING -> STARTING -> STARTED -> (HEALTHY | UNHEALTHY) -> STOPPING -> STOPPED`,
//! with `FAILED` reachable from any running state on abnormal exit and
//! `FAILED -> STARTING` reserved for the restart supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one runtime service instance.
///
/// Exactly one instance exists per declared service per deployment; the
/// instance is owned by the control loop and only mutated through
/// [`crate::runtime::StackRegistry::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Declared but not yet released by the dependency gate
    Pending,
    /// Released; the engine is launching the container
    Starting,
    /// The engine reports the container running; health not yet established
    Started,
    /// Last probe succeeded (or synthesized for services without a check)
    Healthy,
    /// Last probe failed; the service keeps running but no longer
    /// satisfies `service_healthy` dependents
    Unhealthy,
    /// Stop requested or clean exit observed; waiting for the process
    Stopping,
    /// Process gone after a clean or requested stop
    Stopped,
    /// Abnormal exit; the restart supervisor decides what happens next
    Failed,
}

impl ServiceState {
    /// True once the container is running, regardless of health.
    /// This is what a `service_started` dependency condition checks.
    pub fn is_started(self) -> bool {
        matches!(self, Self::Started | Self::Healthy | Self::Unhealthy)
    }

    /// True while a process may still exist for this instance.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Started | Self::Healthy | Self::Unhealthy | Self::Stopping
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Total transition predicate for the instance state machine.
///
/// `Pending -> Stopped` and `Failed -> Stopped` are the teardown paths for
/// instances that never started or were given up on; everything else
/// follows the lifecycle above.
pub fn may_transition(from: ServiceState, to: ServiceState) -> bool {
    use ServiceState::*;
    match (from, to) {
        (Pending, Starting) => true,
        (Pending, Stopped) => true,
        (Starting, Started) => true,
        (Starting, Failed) => true,
        (Started, Healthy) => true,
        (Started, Failed) => true,
        (Started, Stopping) => true,
        (Healthy, Unhealthy) => true,
        (Healthy, Failed) => true,
        (Healthy, Stopping) => true,
        (Unhealthy, Healthy) => true,
        (Unhealthy, Failed) => true,
        (Unhealthy, Stopping) => true,
        (Stopping, Stopped) => true,
        (Failed, Starting) => true,
        (Failed, Stopped) => true,
        _ => false,
    }
}
