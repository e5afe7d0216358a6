//! Deployment validation
//!
//! Definition errors are detected here, at load time, before any service
//! starts: dependencies on undeclared services, cyclic dependency graphs,
//! undeclared volume/network references, malformed health checks, and an
//! empty service set. All of these are fatal and block the whole
//! deployment.

use crate::domain::StackSpec;
use crate::error::ManifestError;
use std::collections::BTreeMap;

/// Validate a resolved stack against the definition-time rules.
pub fn validate(stack: &StackSpec) -> Result<(), ManifestError> {
    if stack.services.is_empty() {
        return Err(ManifestError::NoServices);
    }

    for service in stack.services.values() {
        for edge in &service.depends_on {
            if !stack.services.contains_key(&edge.target) {
                return Err(ManifestError::UnknownDependency {
                    service: service.name.clone(),
                    target: edge.target.clone(),
                });
            }
        }

        for mount in &service.mounts {
            if !stack.volumes.iter().any(|v| v.name == mount.source) {
                return Err(ManifestError::UnknownVolume {
                    service: service.name.clone(),
                    volume: mount.source.clone(),
                });
            }
        }

        for network in &service.networks {
            if !stack.networks.iter().any(|n| &n.name == network) {
                return Err(ManifestError::UnknownNetwork {
                    service: service.name.clone(),
                    network: network.clone(),
                });
            }
        }

        if let Some(check) = &service.healthcheck {
            let invalid = |reason: &str| ManifestError::InvalidHealthCheck {
                service: service.name.clone(),
                reason: reason.to_string(),
            };
            if check.retries == 0 {
                return Err(invalid("retries must be at least 1"));
            }
            if check.interval.is_zero() {
                return Err(invalid("interval must be greater than zero"));
            }
            if check.timeout.is_zero() {
                return Err(invalid("timeout must be greater than zero"));
            }
        }
    }

    start_order(stack).map(|_| ())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Topological start order over the dependency graph: every service
/// appears after all of its upstream targets. Rejects cyclic graphs,
/// reporting the cycle path.
pub fn start_order(stack: &StackSpec) -> Result<Vec<String>, ManifestError> {
    let mut marks: BTreeMap<&str, Mark> = stack
        .services
        .keys()
        .map(|name| (name.as_str(), Mark::Unvisited))
        .collect();
    let mut order = Vec::with_capacity(stack.services.len());
    let mut path = Vec::new();

    for name in stack.services.keys() {
        visit(stack, name, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    stack: &StackSpec,
    name: &str,
    marks: &mut BTreeMap<&str, Mark>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), ManifestError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            // Back edge: slice the current path from the first occurrence
            let start = path.iter().position(|p| p == name).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(ManifestError::DependencyCycle { path: cycle });
        }
        _ => {}
    }

    // Unknown targets are reported by `validate` before this runs; skip
    // them here so start_order stays total over partially valid graphs.
    let Some(service) = stack.services.get(name) else {
        return Ok(());
    };

    if let Some(mark) = marks.get_mut(service.name.as_str()) {
        *mark = Mark::InProgress;
    }
    path.push(name.to_string());

    for edge in &service.depends_on {
        visit(stack, &edge.target, marks, path, order)?;
    }

    path.pop();
    if let Some(mark) = marks.get_mut(service.name.as_str()) {
        *mark = Mark::Done;
    }
    order.push(name.to_string());
    Ok(())
}
