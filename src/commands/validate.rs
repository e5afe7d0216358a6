//! Validate a stack manifest
//!
//! Runs the full load pipeline — interpolation, resolution, definition
//! checks — and prints the resolved start order and a per-service
//! summary. Nothing is started.

use crate::config;
use crate::domain::Condition;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(file: String) -> Result<()> {
    let path = PathBuf::from(&file);
    let stack = config::load_stack(&path)?;
    let order = config::start_order(&stack)?;

    ui::print_header(&format!("Manifest: {}", path.display()));
    ui::print_success(&format!(
        "Valid — {} services, {} volumes, {} networks",
        stack.services.len(),
        stack.volumes.len(),
        stack.networks.len()
    ));
    println!();

    println!("Start order: {}", order.join(" -> ").bright_cyan());
    println!();

    for name in &order {
        let service = &stack.services[name];
        let mut notes = Vec::new();

        for edge in &service.depends_on {
            let condition = match edge.condition {
                Condition::Started => "started",
                Condition::Healthy => "healthy",
            };
            notes.push(format!("after {} ({})", edge.target, condition));
        }
        if let Some(check) = &service.healthcheck {
            notes.push(format!(
                "probe every {} ({} retries)",
                humantime::format_duration(check.interval),
                check.retries
            ));
        }

        if notes.is_empty() {
            println!("  {} {}", name.bold(), service.image.dimmed());
        } else {
            println!(
                "  {} {} | {}",
                name.bold(),
                service.image.dimmed(),
                notes.join(", ")
            );
        }
    }
    println!();

    Ok(())
}
