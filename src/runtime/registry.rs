//! Runtime instance registry
//!
//! The control loop's owned view of every live service: exactly one
//! `RuntimeInstance` per declared service per deployment, mutated only
//! through [`StackRegistry::transition`]. Everything else — the
//! dependency gate, the state file, observers — reads cloned snapshots.

use crate::domain::{may_transition, ServiceState};
use crate::error::RuntimeError;
use std::collections::BTreeMap;
use tracing::debug;

/// Live, mutable counterpart of one service template.
#[derive(Debug, Clone)]
pub struct RuntimeInstance {
    pub state: ServiceState,
    pub restart_count: u32,
    pub last_probe_healthy: Option<bool>,
    pub bring_up_failed: bool,
}

impl RuntimeInstance {
    fn new() -> Self {
        Self {
            state: ServiceState::Pending,
            restart_count: 0,
            last_probe_healthy: None,
            bring_up_failed: false,
        }
    }
}

/// Read-only copy of one instance, safe to hand out of the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub state: ServiceState,
    pub restart_count: u32,
    pub bring_up_failed: bool,
}

/// Read-only copy of the whole stack's runtime state.
#[derive(Debug, Clone, Default)]
pub struct StackSnapshot {
    pub services: BTreeMap<String, InstanceSnapshot>,
}

impl StackSnapshot {
    pub fn state_of(&self, service: &str) -> Option<ServiceState> {
        self.services.get(service).map(|s| s.state)
    }

    pub fn bring_up_failed(&self, service: &str) -> bool {
        self.services
            .get(service)
            .map(|s| s.bring_up_failed)
            .unwrap_or(false)
    }

    pub fn restart_count(&self, service: &str) -> u32 {
        self.services
            .get(service)
            .map(|s| s.restart_count)
            .unwrap_or(0)
    }
}

/// Owned registry of all runtime instances, keyed by service identity.
#[derive(Debug)]
pub struct StackRegistry {
    instances: BTreeMap<String, RuntimeInstance>,
}

impl StackRegistry {
    /// All instances begin in `Pending`.
    pub fn new<'a>(services: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            instances: services
                .into_iter()
                .map(|name| (name.clone(), RuntimeInstance::new()))
                .collect(),
        }
    }

    pub fn state(&self, service: &str) -> Option<ServiceState> {
        self.instances.get(service).map(|i| i.state)
    }

    pub fn restart_count(&self, service: &str) -> u32 {
        self.instances
            .get(service)
            .map(|i| i.restart_count)
            .unwrap_or(0)
    }

    /// Apply one state-machine transition. Illegal transitions are
    /// rejected, never silently applied; stale events surface here as
    /// errors the caller can drop with a debug log.
    pub fn transition(
        &mut self,
        service: &str,
        to: ServiceState,
    ) -> Result<(), RuntimeError> {
        let instance =
            self.instances
                .get_mut(service)
                .ok_or_else(|| RuntimeError::UnknownService {
                    service: service.to_string(),
                })?;

        if !may_transition(instance.state, to) {
            return Err(RuntimeError::IllegalTransition {
                service: service.to_string(),
                from: instance.state,
                to,
            });
        }

        debug!("{}: {} -> {}", service, instance.state, to);
        instance.state = to;
        Ok(())
    }

    pub fn record_probe(&mut self, service: &str, healthy: bool) {
        if let Some(instance) = self.instances.get_mut(service) {
            instance.last_probe_healthy = Some(healthy);
        }
    }

    pub fn mark_bring_up_failed(&mut self, service: &str) {
        if let Some(instance) = self.instances.get_mut(service) {
            instance.bring_up_failed = true;
        }
    }

    pub fn note_restart(&mut self, service: &str) {
        if let Some(instance) = self.instances.get_mut(service) {
            instance.restart_count += 1;
        }
    }

    /// Services currently in the given state, in name order.
    pub fn services_in(&self, state: ServiceState) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, i)| i.state == state)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn all_stopped(&self) -> bool {
        self.instances
            .values()
            .all(|i| i.state == ServiceState::Stopped)
    }

    /// No instance has (or may still get) a live process.
    pub fn none_live(&self) -> bool {
        self.instances.values().all(|i| !i.state.is_live())
    }

    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            services: self
                .instances
                .iter()
                .map(|(name, i)| {
                    (
                        name.clone(),
                        InstanceSnapshot {
                            state: i.state,
                            restart_count: i.restart_count,
                            bring_up_failed: i.bring_up_failed,
                        },
                    )
                })
                .collect(),
        }
    }
}
