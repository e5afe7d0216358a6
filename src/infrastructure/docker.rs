//! Docker CLI adapter
//!
//! Drives the container engine through its CLI: build an argv, run it,
//! check the status, fold stderr into a typed error. Containers, volumes,
//! and networks are labeled `com.capstan.stack=<name>` so teardown can
//! find them out-of-process; volume and network names carry a
//! `<stack>_` prefix, container names a `<stack>-` prefix.

use crate::domain::{HealthCheck, NetworkSpec, ServiceSpec, VolumeSpec};
use crate::error::EngineError;
use crate::runtime::{ExitSummary, ProbeOutcome, Provisioner, ServiceHandle, ServiceRunner};
use anyhow::Result;
use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

const ENGINE_BINARY: &str = "docker";

async fn run_engine(args: &[String]) -> Result<Output, EngineError> {
    // Identify the failing invocation by subcommand only; full argv can
    // carry environment secrets
    let command = format!(
        "{} {}",
        ENGINE_BINARY,
        args.first().map(String::as_str).unwrap_or_default()
    );

    let output = Command::new(ENGINE_BINARY)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| EngineError::SpawnFailed {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(EngineError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Container engine adapter for one stack.
pub struct DockerCli {
    stack: String,
}

impl DockerCli {
    /// Fails fast when the engine binary is not installed.
    pub fn new(stack: impl Into<String>) -> Result<Self, EngineError> {
        which::which(ENGINE_BINARY).map_err(|_| EngineError::BinaryNotFound {
            binary: ENGINE_BINARY.to_string(),
        })?;
        Ok(Self {
            stack: stack.into(),
        })
    }

    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{}", self.stack, service)
    }

    pub fn resource_name(&self, name: &str) -> String {
        format!("{}_{}", self.stack, name)
    }

    pub fn stack_label(&self) -> String {
        format!("com.capstan.stack={}", self.stack)
    }

    /// Argv for launching one service, minus the leading binary.
    fn run_args(&self, spec: &ServiceSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--detach".into(),
            "--name".into(),
            self.container_name(&spec.name),
            "--label".into(),
            self.stack_label(),
        ];

        if let Some(network) = spec.networks.first() {
            args.push("--network".into());
            args.push(self.resource_name(network));
        }
        for mount in &spec.mounts {
            let mut value = format!("{}:{}", self.resource_name(&mount.source), mount.target);
            if mount.read_only {
                value.push_str(":ro");
            }
            args.push("--volume".into());
            args.push(value);
        }
        for port in &spec.ports {
            let value = match &port.bind_address {
                Some(bind) => format!("{}:{}:{}", bind, port.host_port, port.container_port),
                None => format!("{}:{}", port.host_port, port.container_port),
            };
            args.push("--publish".into());
            args.push(value);
        }
        for (key, value) in &spec.environment {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    /// Containers belonging to this stack, running or not.
    pub async fn list_stack_containers(&self) -> Result<Vec<String>, EngineError> {
        let output = run_engine(&[
            "ps".into(),
            "--all".into(),
            "--quiet".into(),
            "--filter".into(),
            format!("label={}", self.stack_label()),
        ])
        .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    pub async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        run_engine(&["stop".into(), id.to_string()]).await?;
        run_engine(&["rm".into(), id.to_string()]).await?;
        Ok(())
    }

    pub async fn remove_network_if_present(&self, network: &NetworkSpec) -> Result<(), EngineError> {
        let name = self.resource_name(&network.name);
        if run_engine(&["network".into(), "inspect".into(), name.clone()])
            .await
            .is_err()
        {
            return Ok(());
        }
        run_engine(&["network".into(), "rm".into(), name]).await?;
        Ok(())
    }

    pub async fn remove_volume_if_present(&self, volume: &VolumeSpec) -> Result<(), EngineError> {
        let name = self.resource_name(&volume.name);
        if run_engine(&["volume".into(), "inspect".into(), name.clone()])
            .await
            .is_err()
        {
            return Ok(());
        }
        run_engine(&["volume".into(), "rm".into(), name]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceRunner for DockerCli {
    async fn start(&self, spec: &ServiceSpec) -> Result<Box<dyn ServiceHandle>> {
        // A stale container from a previous run blocks the name; clear it
        let _ = run_engine(&[
            "rm".into(),
            "--force".into(),
            self.container_name(&spec.name),
        ])
        .await;

        let output = run_engine(&self.run_args(spec)).await?;
        let id = stdout_line(&output);
        if id.is_empty() {
            return Err(EngineError::UnexpectedOutput {
                command: "docker run".to_string(),
                output: "no container id returned".to_string(),
            }
            .into());
        }

        // `docker run` joins one network; connect the rest afterwards
        for network in spec.networks.iter().skip(1) {
            run_engine(&[
                "network".into(),
                "connect".into(),
                self.resource_name(network),
                id.clone(),
            ])
            .await?;
        }

        debug!("Launched '{}' as {}", spec.name, id);
        Ok(Box::new(DockerHandle { id }))
    }

    async fn probe(&self, spec: &ServiceSpec, check: &HealthCheck) -> ProbeOutcome {
        let mut args: Vec<String> = vec!["exec".into(), self.container_name(&spec.name)];
        args.extend(check.command.argv.iter().cloned());

        match tokio::time::timeout(check.timeout, run_engine(&args)).await {
            Ok(Ok(_)) => ProbeOutcome::Healthy,
            Ok(Err(err)) => {
                debug!("Probe failed for '{}': {}", spec.name, err);
                ProbeOutcome::Unhealthy
            }
            // A probe past its timeout is a failure, never left pending
            Err(_) => {
                debug!(
                    "Probe for '{}' timed out after {:?}",
                    spec.name, check.timeout
                );
                ProbeOutcome::Unhealthy
            }
        }
    }
}

#[async_trait]
impl Provisioner for DockerCli {
    async fn ensure_volume(&self, volume: &VolumeSpec) -> Result<()> {
        run_engine(&[
            "volume".into(),
            "create".into(),
            "--driver".into(),
            volume.driver.clone(),
            "--label".into(),
            self.stack_label(),
            self.resource_name(&volume.name),
        ])
        .await?;
        Ok(())
    }

    async fn remove_volume(&self, volume: &VolumeSpec) -> Result<()> {
        self.remove_volume_if_present(volume).await?;
        Ok(())
    }

    async fn ensure_network(&self, network: &NetworkSpec) -> Result<()> {
        let name = self.resource_name(&network.name);
        if run_engine(&["network".into(), "inspect".into(), name.clone()])
            .await
            .is_ok()
        {
            return Ok(());
        }
        run_engine(&[
            "network".into(),
            "create".into(),
            "--driver".into(),
            network.driver.clone(),
            "--label".into(),
            self.stack_label(),
            name,
        ])
        .await?;
        Ok(())
    }

    async fn remove_network(&self, network: &NetworkSpec) -> Result<()> {
        self.remove_network_if_present(network).await?;
        Ok(())
    }
}

struct DockerHandle {
    id: String,
}

#[async_trait]
impl ServiceHandle for DockerHandle {
    async fn wait(&mut self) -> ExitSummary {
        match run_engine(&["wait".into(), self.id.clone()]).await {
            Ok(output) => match stdout_line(&output).parse::<i64>() {
                Ok(code) => ExitSummary {
                    success: code == 0,
                    code: Some(code),
                },
                Err(_) => {
                    warn!("Unparseable exit code for {}", self.id);
                    ExitSummary {
                        success: false,
                        code: None,
                    }
                }
            },
            Err(err) => {
                warn!("Wait failed for {}: {}", self.id, err);
                ExitSummary {
                    success: false,
                    code: None,
                }
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        run_engine(&["stop".into(), self.id.clone()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PortBinding, RestartPolicy, VolumeMount};
    use std::collections::BTreeMap;

    fn cli() -> DockerCli {
        // Bypass the binary preflight; arg building is pure
        DockerCli {
            stack: "erp".to_string(),
        }
    }

    fn spec() -> ServiceSpec {
        ServiceSpec {
            name: "frontend".to_string(),
            image: "proxy:1".to_string(),
            command: vec!["nginx".to_string(), "-g".to_string(), "daemon off;".to_string()],
            environment: BTreeMap::from([("BACKEND".to_string(), "backend:8000".to_string())]),
            mounts: vec![VolumeMount {
                source: "sites".to_string(),
                target: "/srv/sites".to_string(),
                read_only: true,
            }],
            networks: vec!["erp".to_string()],
            ports: vec![PortBinding {
                bind_address: Some("0.0.0.0".to_string()),
                host_port: 8080,
                container_port: 8080,
            }],
            depends_on: vec![],
            restart: RestartPolicy::No,
            healthcheck: None,
        }
    }

    #[test]
    fn test_naming_conventions() {
        let cli = cli();
        assert_eq!(cli.container_name("backend"), "erp-backend");
        assert_eq!(cli.resource_name("db-data"), "erp_db-data");
        assert_eq!(cli.stack_label(), "com.capstan.stack=erp");
    }

    #[test]
    fn test_run_args_layout() {
        let args = cli().run_args(&spec());

        assert_eq!(args[0], "run");
        assert!(args.contains(&"--detach".to_string()));
        assert!(args.windows(2).any(|w| w == ["--name", "erp-frontend"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--label", "com.capstan.stack=erp"]));
        assert!(args.windows(2).any(|w| w == ["--network", "erp_erp"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--volume", "erp_sites:/srv/sites:ro"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--publish", "0.0.0.0:8080:8080"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--env", "BACKEND=backend:8000"]));

        // Image comes before the command override
        let image_pos = args.iter().position(|a| a == "proxy:1").unwrap();
        let cmd_pos = args.iter().position(|a| a == "nginx").unwrap();
        assert!(image_pos < cmd_pos);
        assert_eq!(args.last().unwrap(), "daemon off;");
    }

    #[test]
    fn test_run_args_without_bind_address() {
        let mut service = spec();
        service.ports = vec![PortBinding {
            bind_address: None,
            host_port: 9000,
            container_port: 9000,
        }];
        let args = cli().run_args(&service);
        assert!(args.windows(2).any(|w| w == ["--publish", "9000:9000"]));
    }
}
