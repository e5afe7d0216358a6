//! Stack manifest model
//!
//! The external boundary: a compose-style YAML document declaring, per
//! service, the image reference, network memberships, volume mounts,
//! published ports, environment assignments, start command override,
//! dependency list with condition, restart policy, and an optional health
//! check. Top-level sections declare named volumes and networks with a
//! driver identifier.
//!
//! Deserialization is deliberately permissive (short and long forms,
//! string and list scalars); `resolve` turns the raw document into the
//! immutable domain templates and rejects anything malformed.

use crate::domain::{
    Condition, DependencyEdge, HealthCheck, NetworkSpec, PortBinding, ProbeCommand, RestartPolicy,
    ServiceSpec, StackSpec, VolumeMount, VolumeSpec,
};
use crate::error::ManifestError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Raw deserialized manifest, prior to resolution and validation.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_stack_name")]
    pub name: String,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceDef>,

    /// Named persistent volumes; value may be empty or `{driver: ...}`
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<VolumeDef>>,

    /// Named networks; value may be empty or `{driver: ...}`
    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkDef>>,
}

fn default_stack_name() -> String {
    "stack".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ServiceDef {
    /// Image reference (required)
    pub image: String,

    /// Start command override
    #[serde(default)]
    pub command: Option<CommandDef>,

    #[serde(default)]
    pub environment: EnvironmentDef,

    /// `source:target[:ro]` mount strings
    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub networks: Vec<String>,

    /// `[bind:]host:container` port strings
    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub depends_on: DependsOnDef,

    /// `no` (default) or `on-failure[:max-retries]`
    #[serde(default)]
    pub restart: Option<String>,

    #[serde(default)]
    pub healthcheck: Option<HealthcheckDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CommandDef {
    Line(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentDef {
    Map(BTreeMap<String, String>),
    /// `KEY=value` entries; a bare `KEY` passes the process value through
    List(Vec<String>),
}

impl Default for EnvironmentDef {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DependsOnDef {
    /// Short form: a list of names, condition `service_started`
    Short(Vec<String>),
    /// Long form: name -> `{condition: ...}`
    Long(BTreeMap<String, DependsOnEntry>),
}

impl Default for DependsOnDef {
    fn default() -> Self {
        Self::Short(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
pub struct DependsOnEntry {
    #[serde(default)]
    pub condition: ConditionDef,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionDef {
    #[default]
    ServiceStarted,
    ServiceHealthy,
}

#[derive(Debug, Deserialize)]
pub struct HealthcheckDef {
    pub test: HealthcheckTest,

    #[serde(default = "default_probe_interval")]
    pub interval: String,

    #[serde(default = "default_probe_retries")]
    pub retries: u32,

    #[serde(default = "default_probe_timeout")]
    pub timeout: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HealthcheckTest {
    /// Shell form, run as `/bin/sh -c`
    Shell(String),
    /// `["CMD", ...]`, `["CMD-SHELL", script]`, or `["NONE"]`
    Spec(Vec<String>),
}

fn default_probe_interval() -> String {
    "30s".to_string()
}

fn default_probe_retries() -> u32 {
    3
}

fn default_probe_timeout() -> String {
    "30s".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct VolumeDef {
    #[serde(default)]
    pub driver: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkDef {
    #[serde(default)]
    pub driver: Option<String>,
}

impl Manifest {
    /// Resolve the raw manifest into immutable domain templates.
    ///
    /// Services that list no networks join the stack's first declared
    /// network. Cross-reference checks (undeclared dependency targets,
    /// volumes, networks) and graph acyclicity are the validator's job.
    pub fn resolve(self) -> Result<StackSpec, ManifestError> {
        let networks: Vec<NetworkSpec> = self
            .networks
            .into_iter()
            .map(|(name, def)| NetworkSpec {
                name,
                driver: def
                    .unwrap_or_default()
                    .driver
                    .unwrap_or_else(|| "bridge".to_string()),
            })
            .collect();

        let volumes: Vec<VolumeSpec> = self
            .volumes
            .into_iter()
            .map(|(name, def)| VolumeSpec {
                name,
                driver: def
                    .unwrap_or_default()
                    .driver
                    .unwrap_or_else(|| "local".to_string()),
            })
            .collect();

        let default_networks: Vec<String> =
            networks.first().map(|n| vec![n.name.clone()]).unwrap_or_default();

        let mut services = BTreeMap::new();
        for (name, def) in self.services {
            let spec = resolve_service(&name, def, &default_networks)?;
            services.insert(name, spec);
        }

        Ok(StackSpec {
            name: self.name,
            services,
            volumes,
            networks,
        })
    }
}

fn resolve_service(
    name: &str,
    def: ServiceDef,
    default_networks: &[String],
) -> Result<ServiceSpec, ManifestError> {
    let command = match def.command {
        None => Vec::new(),
        Some(CommandDef::Argv(argv)) => argv,
        Some(CommandDef::Line(line)) => line.split_whitespace().map(str::to_string).collect(),
    };

    let environment = match def.environment {
        EnvironmentDef::Map(map) => map,
        EnvironmentDef::List(entries) => entries
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => {
                    let value = std::env::var(&entry).unwrap_or_default();
                    (entry, value)
                }
            })
            .collect(),
    };

    let mounts = def
        .volumes
        .iter()
        .map(|raw| parse_mount(name, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let ports = def
        .ports
        .iter()
        .map(|raw| parse_port(name, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let depends_on = match def.depends_on {
        DependsOnDef::Short(targets) => targets
            .into_iter()
            .map(|target| DependencyEdge {
                target,
                condition: Condition::Started,
            })
            .collect(),
        DependsOnDef::Long(entries) => entries
            .into_iter()
            .map(|(target, entry)| DependencyEdge {
                target,
                condition: match entry.condition {
                    ConditionDef::ServiceStarted => Condition::Started,
                    ConditionDef::ServiceHealthy => Condition::Healthy,
                },
            })
            .collect(),
    };

    let restart = parse_restart(name, def.restart.as_deref())?;
    let healthcheck = def
        .healthcheck
        .map(|hc| resolve_healthcheck(name, hc))
        .transpose()?
        .flatten();

    let networks = if def.networks.is_empty() {
        default_networks.to_vec()
    } else {
        def.networks
    };

    Ok(ServiceSpec {
        name: name.to_string(),
        image: def.image,
        command,
        environment,
        mounts,
        networks,
        ports,
        depends_on,
        restart,
        healthcheck,
    })
}

fn parse_mount(service: &str, raw: &str) -> Result<VolumeMount, ManifestError> {
    let invalid = || ManifestError::InvalidMount {
        service: service.to_string(),
        value: raw.to_string(),
    };

    let parts: Vec<&str> = raw.split(':').collect();
    let (source, target, read_only) = match parts.as_slice() {
        [source, target] => (source, target, false),
        [source, target, "ro"] => (source, target, true),
        [source, target, "rw"] => (source, target, false),
        _ => return Err(invalid()),
    };

    if source.is_empty() || target.is_empty() || !target.starts_with('/') {
        return Err(invalid());
    }

    Ok(VolumeMount {
        source: source.to_string(),
        target: target.to_string(),
        read_only,
    })
}

fn parse_port(service: &str, raw: &str) -> Result<PortBinding, ManifestError> {
    let invalid = || ManifestError::InvalidPort {
        service: service.to_string(),
        value: raw.to_string(),
    };

    let parts: Vec<&str> = raw.split(':').collect();
    let (bind_address, host, container) = match parts.as_slice() {
        [host, container] => (None, host, container),
        [bind, host, container] => (Some(bind.to_string()), host, container),
        _ => return Err(invalid()),
    };

    Ok(PortBinding {
        bind_address,
        host_port: host.parse().map_err(|_| invalid())?,
        container_port: container.parse().map_err(|_| invalid())?,
    })
}

fn parse_restart(service: &str, raw: Option<&str>) -> Result<RestartPolicy, ManifestError> {
    let unsupported = |value: &str| ManifestError::UnsupportedRestartPolicy {
        service: service.to_string(),
        value: value.to_string(),
    };

    match raw {
        None | Some("no") => Ok(RestartPolicy::No),
        Some("on-failure") => Ok(RestartPolicy::OnFailure { max_retries: None }),
        Some(value) => match value.strip_prefix("on-failure:") {
            Some(count) => {
                let max = count.parse().map_err(|_| unsupported(value))?;
                Ok(RestartPolicy::OnFailure {
                    max_retries: Some(max),
                })
            }
            None => Err(unsupported(value)),
        },
    }
}

fn resolve_healthcheck(
    service: &str,
    def: HealthcheckDef,
) -> Result<Option<HealthCheck>, ManifestError> {
    let invalid = |reason: &str| ManifestError::InvalidHealthCheck {
        service: service.to_string(),
        reason: reason.to_string(),
    };

    let command = match def.test {
        HealthcheckTest::Shell(script) => {
            if script.trim().is_empty() {
                return Err(invalid("empty probe command"));
            }
            ProbeCommand::shell(script)
        }
        HealthcheckTest::Spec(parts) => {
            let Some((head, rest)) = parts.split_first() else {
                return Err(invalid("empty test"));
            };
            match head.as_str() {
                "CMD" => {
                    if rest.is_empty() {
                        return Err(invalid("CMD form requires a command"));
                    }
                    ProbeCommand::exec(rest.to_vec())
                }
                "CMD-SHELL" => {
                    let script = rest.join(" ");
                    if script.trim().is_empty() {
                        return Err(invalid("CMD-SHELL form requires a script"));
                    }
                    ProbeCommand::shell(script)
                }
                "NONE" => return Ok(None),
                other => {
                    return Err(invalid(&format!(
                        "unknown test form '{other}' (expected CMD, CMD-SHELL, or NONE)"
                    )))
                }
            }
        }
    };

    Ok(Some(HealthCheck {
        command,
        interval: parse_duration(service, &def.interval)?,
        retries: def.retries,
        timeout: parse_duration(service, &def.timeout)?,
    }))
}

fn parse_duration(service: &str, raw: &str) -> Result<Duration, ManifestError> {
    humantime::parse_duration(raw).map_err(|e| ManifestError::InvalidDuration {
        service: service.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
