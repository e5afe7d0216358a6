//! Out-of-process stack teardown
//!
//! Finds everything carrying the stack label, stops and removes the
//! containers, then removes the network. Named volumes are removed only
//! with `--volumes` — no other path ever destroys them.

use crate::config;
use crate::infrastructure::DockerCli;
use crate::ui;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

pub async fn execute(file: String, volumes: bool) -> Result<()> {
    let path = PathBuf::from(&file);
    // Values of required variables are irrelevant for teardown
    let stack = config::load_stack_lenient(&path)?;

    ui::print_header(&format!("Tearing down stack '{}'", stack.name));
    let engine = DockerCli::new(&stack.name)?;

    let containers = engine.list_stack_containers().await?;
    if containers.is_empty() {
        ui::print_warning(&format!("No containers found for stack '{}'", stack.name));
    }
    for id in &containers {
        info!("Removing container {}", id);
        engine.remove_container(id).await?;
    }

    for network in &stack.networks {
        info!("Removing network '{}'", network.name);
        engine.remove_network_if_present(network).await?;
    }

    if volumes {
        for volume in &stack.volumes {
            info!("Removing volume '{}'", volume.name);
            engine.remove_volume_if_present(volume).await?;
        }
        ui::print_success("Stack and volumes removed");
    } else {
        ui::print_success(&format!(
            "Stack removed ({} named volume(s) preserved)",
            stack.volumes.len()
        ));
    }

    Ok(())
}
