//! Bring the stack up and supervise it in the foreground
//!
//! Provisions shared resources, releases services through the dependency
//! gate, and runs the controller until SIGINT requests teardown. Exits
//! non-zero when any service suffered a bring-up failure or was abandoned
//! by the restart supervisor.

use crate::config;
use crate::error::RuntimeError;
use crate::infrastructure::DockerCli;
use crate::runtime::{StackController, StackOptions};
use crate::ui;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_STATE_FILE: &str = ".capstan/state.json";

pub async fn execute(file: String, state_file: Option<String>) -> Result<()> {
    let path = PathBuf::from(&file);
    let stack = config::load_stack(&path)?;

    ui::print_header(&format!(
        "Stack '{}' — {} services",
        stack.name,
        stack.services.len()
    ));

    let engine = Arc::new(DockerCli::new(&stack.name)?);
    let options = StackOptions {
        state_file: Some(PathBuf::from(
            state_file.as_deref().unwrap_or(DEFAULT_STATE_FILE),
        )),
        remove_volumes_on_teardown: false,
    };

    let (controller, handle) = StackController::new(stack, engine.clone(), engine, options);

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, tearing down...");
            shutdown_handle.shutdown();
        }
    });

    let report = controller.run().await?;

    if report.is_clean() {
        ui::print_success("Stack stopped cleanly");
        return Ok(());
    }

    for service in &report.gave_up {
        ui::print_error(&format!("Abandoned after restart budget: {service}"));
    }
    if !report.bring_up_failures.is_empty() {
        for service in &report.bring_up_failures {
            ui::print_error(&format!("Bring-up failed: {service}"));
        }
        return Err(RuntimeError::BringUpFailed {
            services: report.bring_up_failures,
        }
        .into());
    }
    anyhow::bail!(
        "Stack finished with {} abandoned service(s)",
        report.gave_up.len()
    )
}
