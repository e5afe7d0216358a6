//! Dependency gate
//!
//! Blocks a service's start until every declared upstream dependency
//! satisfies its required condition. Evaluated against read snapshots of
//! the registry on every state-change event — event-driven, never polled
//! — and a service with N unmet dependencies waits on all N.
//!
//! Targets without a health check synthesize HEALTHY immediately upon
//! STARTED (see the control loop), so a `service_healthy` condition on
//! such a target is satisfiable the moment it is running. The alternative
//! — treating it as never satisfiable — would deadlock the stack forever.

use crate::domain::{Condition, DependencyEdge, ServiceSpec, ServiceState};
use crate::runtime::StackSnapshot;

/// True iff every dependency edge of `spec` is satisfied.
pub fn can_start(spec: &ServiceSpec, snapshot: &StackSnapshot) -> bool {
    spec.depends_on
        .iter()
        .all(|edge| satisfied(edge, snapshot))
}

fn satisfied(edge: &DependencyEdge, snapshot: &StackSnapshot) -> bool {
    let Some(state) = snapshot.state_of(&edge.target) else {
        return false;
    };
    match edge.condition {
        Condition::Started => state.is_started(),
        Condition::Healthy => state == ServiceState::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::InstanceSnapshot;
    use std::collections::BTreeMap;

    fn snapshot(states: &[(&str, ServiceState)]) -> StackSnapshot {
        StackSnapshot {
            services: states
                .iter()
                .map(|(name, state)| {
                    (
                        name.to_string(),
                        InstanceSnapshot {
                            state: *state,
                            restart_count: 0,
                            bring_up_failed: false,
                        },
                    )
                })
                .collect(),
        }
    }

    fn spec(deps: &[(&str, Condition)]) -> ServiceSpec {
        ServiceSpec {
            name: "subject".to_string(),
            image: "img".to_string(),
            command: vec![],
            environment: BTreeMap::new(),
            mounts: vec![],
            networks: vec![],
            ports: vec![],
            depends_on: deps
                .iter()
                .map(|(target, condition)| DependencyEdge {
                    target: target.to_string(),
                    condition: *condition,
                })
                .collect(),
            restart: crate::domain::RestartPolicy::No,
            healthcheck: None,
        }
    }

    #[test]
    fn test_no_dependencies_always_eligible() {
        assert!(can_start(&spec(&[]), &snapshot(&[])));
    }

    #[test]
    fn test_started_condition() {
        let service = spec(&[("db", Condition::Started)]);
        for state in [
            ServiceState::Started,
            ServiceState::Healthy,
            ServiceState::Unhealthy,
        ] {
            assert!(can_start(&service, &snapshot(&[("db", state)])));
        }
        for state in [
            ServiceState::Pending,
            ServiceState::Starting,
            ServiceState::Stopping,
            ServiceState::Stopped,
            ServiceState::Failed,
        ] {
            assert!(!can_start(&service, &snapshot(&[("db", state)])));
        }
    }

    #[test]
    fn test_healthy_condition_requires_healthy() {
        let service = spec(&[("db", Condition::Healthy)]);
        assert!(can_start(
            &service,
            &snapshot(&[("db", ServiceState::Healthy)])
        ));
        // Started is not enough, and neither is Unhealthy
        for state in [
            ServiceState::Started,
            ServiceState::Unhealthy,
            ServiceState::Starting,
            ServiceState::Failed,
        ] {
            assert!(!can_start(&service, &snapshot(&[("db", state)])));
        }
    }

    #[test]
    fn test_all_edges_must_be_satisfied() {
        let service = spec(&[
            ("db", Condition::Healthy),
            ("redis-cache", Condition::Started),
        ]);

        // Only one of two satisfied
        assert!(!can_start(
            &service,
            &snapshot(&[
                ("db", ServiceState::Healthy),
                ("redis-cache", ServiceState::Starting),
            ])
        ));
        assert!(!can_start(
            &service,
            &snapshot(&[
                ("db", ServiceState::Started),
                ("redis-cache", ServiceState::Started),
            ])
        ));
        // Both satisfied
        assert!(can_start(
            &service,
            &snapshot(&[
                ("db", ServiceState::Healthy),
                ("redis-cache", ServiceState::Started),
            ])
        ));
    }

    #[test]
    fn test_unknown_target_never_satisfies() {
        let service = spec(&[("ghost", Condition::Started)]);
        assert!(!can_start(&service, &snapshot(&[])));
    }
}
