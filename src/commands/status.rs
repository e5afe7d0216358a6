//! Render the last recorded stack state
//!
//! Reads the snapshot file the supervisor writes on every transition.

use crate::commands::up::DEFAULT_STATE_FILE;
use crate::runtime::status;
use crate::ui;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(state_file: Option<String>) -> Result<()> {
    let path = PathBuf::from(state_file.as_deref().unwrap_or(DEFAULT_STATE_FILE));
    let state = status::read(&path)
        .context("No recorded state — has the stack been started with `capstan up`?")?;

    println!();
    println!("Stack: {}", state.stack.bold());
    println!("Updated: {}", format_age(&state.updated_at));
    println!();

    for (name, service) in &state.services {
        let rendered = ui::render_state(service.state);

        let mut notes = Vec::new();
        if service.restarts > 0 {
            notes.push(format!("restarts: {}", service.restarts));
        }
        if service.bring_up_failed {
            notes.push("bring-up failed".to_string());
        }

        if notes.is_empty() {
            println!("  {:<16} {}", name, rendered);
        } else {
            println!("  {:<16} {} | {}", name, rendered, notes.join(" | "));
        }
    }
    println!();

    Ok(())
}

fn format_age(updated_at: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(updated_at) {
        Ok(then) => {
            let age = chrono::Utc::now().signed_duration_since(then);
            format!("{} ({}s ago)", updated_at, age.num_seconds().max(0))
        }
        Err(_) => updated_at.to_string(),
    }
}
