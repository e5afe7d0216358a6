//! Engine-facing trait seams
//!
//! Services are opaque to the orchestrator: the engine starts them, waits
//! on them, stops them, and execs health probes inside them. These traits
//! are what the control loop sees; the docker adapter implements them for
//! real deployments and the test harness scripts them under a paused
//! clock.

use crate::domain::{HealthCheck, NetworkSpec, ServiceSpec, VolumeSpec};
use anyhow::Result;
use async_trait::async_trait;

/// Final status of an exited service process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    pub success: bool,
    pub code: Option<i64>,
}

/// Result of a single health probe. Probe execution errors and timeouts
/// both collapse to `Unhealthy`; a probe is never left pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
}

/// A running service process owned by one supervision task.
#[async_trait]
pub trait ServiceHandle: Send {
    /// Resolves when the process exits.
    async fn wait(&mut self) -> ExitSummary;

    /// Ask the engine to stop the process. `wait` still reports the exit.
    async fn stop(&mut self) -> Result<()>;
}

/// Starts service processes and runs health probes against them.
#[async_trait]
pub trait ServiceRunner: Send + Sync {
    async fn start(&self, spec: &ServiceSpec) -> Result<Box<dyn ServiceHandle>>;

    /// Run one probe, applying the check's timeout.
    async fn probe(&self, spec: &ServiceSpec, check: &HealthCheck) -> ProbeOutcome;
}

/// Provisions and releases the shared resources services mount and join.
/// Creation happens before any service starts; release only after every
/// instance has stopped.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn ensure_volume(&self, volume: &VolumeSpec) -> Result<()>;
    async fn remove_volume(&self, volume: &VolumeSpec) -> Result<()>;
    async fn ensure_network(&self, network: &NetworkSpec) -> Result<()>;
    async fn remove_network(&self, network: &NetworkSpec) -> Result<()>;
}
