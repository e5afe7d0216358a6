//! Resolved service templates
//!
//! These are the read-only counterparts of the manifest: fully
//! interpolated, validated, and immutable for the lifetime of one
//! deployment. The control loop owns the mutable runtime instances;
//! everything here is a template it reads.

use std::collections::BTreeMap;
use std::time::Duration;

/// Dependency condition between two services.
///
/// Closed two-variant enum evaluated by total match in the dependency
/// gate — never by comparing strings at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Target must have reached STARTED (health irrelevant)
    Started,
    /// Target must currently be HEALTHY
    Healthy,
}

/// A directed "must wait for" edge from a service to its upstream target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Upstream service name
    pub target: String,
    pub condition: Condition,
}

/// Restart policy consulted on abnormal exit only.
///
/// `OnFailure { max_retries: None }` preserves the uncapped behavior of the
/// source manifests; the optional cap makes the restart budget an explicit
/// policy parameter instead of a hard-coded infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart
    No,
    /// Restart on abnormal exit, up to `max_retries` times if capped
    OnFailure { max_retries: Option<u32> },
}

/// Health probe command, in engine exec form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    /// argv executed inside the running container
    pub argv: Vec<String>,
}

impl ProbeCommand {
    /// Shell-form probe: wrapped in `/bin/sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            argv: vec!["/bin/sh".to_string(), "-c".to_string(), script.into()],
        }
    }

    /// Exec-form probe: argv used as-is.
    pub fn exec(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

/// Periodic liveness probe, at most one per service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub command: ProbeCommand,
    /// Time between consecutive probes
    pub interval: Duration,
    /// Probe budget before the first success; exhausting it is a
    /// stack-level bring-up failure
    pub retries: u32,
    /// A probe running past this is counted as a failure, never left pending
    pub timeout: Duration,
}

/// Named volume mount: source volume -> container path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Published port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Host bind address; engine default when absent
    pub bind_address: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
}

/// One fully resolved service template.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// Start command override; engine image default when empty
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub mounts: Vec<VolumeMount>,
    pub networks: Vec<String>,
    pub ports: Vec<PortBinding>,
    pub depends_on: Vec<DependencyEdge>,
    pub restart: RestartPolicy,
    pub healthcheck: Option<HealthCheck>,
}

impl ServiceSpec {
    /// Whether this service carries its own health probe. Services
    /// without one synthesize HEALTHY immediately upon STARTED.
    pub fn has_healthcheck(&self) -> bool {
        self.healthcheck.is_some()
    }
}

/// Named persistent volume; lifecycle independent of any single service.
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub name: String,
    pub driver: String,
}

/// Named isolated network joining all services of one deployment instance.
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
}

/// The whole resolved deployment: services keyed by name plus the shared
/// resources they mount and join.
#[derive(Debug, Clone)]
pub struct StackSpec {
    pub name: String,
    pub services: BTreeMap<String, ServiceSpec>,
    pub volumes: Vec<VolumeSpec>,
    pub networks: Vec<NetworkSpec>,
}

impl StackSpec {
    /// Names of services that declare a dependency on `target`.
    pub fn dependents_of(&self, target: &str) -> Vec<&str> {
        self.services
            .values()
            .filter(|s| s.depends_on.iter().any(|e| e.target == target))
            .map(|s| s.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(name: &str, deps: Vec<DependencyEdge>) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            image: "scratch".to_string(),
            command: vec![],
            environment: BTreeMap::new(),
            mounts: vec![],
            networks: vec![],
            ports: vec![],
            depends_on: deps,
            restart: RestartPolicy::No,
            healthcheck: None,
        }
    }

    #[test]
    fn test_dependents_of() {
        let mut services = BTreeMap::new();
        services.insert("db".to_string(), minimal("db", vec![]));
        services.insert(
            "backend".to_string(),
            minimal(
                "backend",
                vec![DependencyEdge {
                    target: "db".to_string(),
                    condition: Condition::Healthy,
                }],
            ),
        );
        let stack = StackSpec {
            name: "test".to_string(),
            services,
            volumes: vec![],
            networks: vec![],
        };

        assert_eq!(stack.dependents_of("db"), vec!["backend"]);
        assert!(stack.dependents_of("backend").is_empty());
    }

    #[test]
    fn test_shell_probe_form() {
        let probe = ProbeCommand::shell("mysqladmin ping -h localhost");
        assert_eq!(probe.argv[0], "/bin/sh");
        assert_eq!(probe.argv[1], "-c");
        assert_eq!(probe.argv[2], "mysqladmin ping -h localhost");
    }
}
