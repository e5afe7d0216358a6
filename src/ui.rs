// Terminal UI utilities

use crate::domain::ServiceState;
use colored::{ColoredString, Colorize};

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Lifecycle state colored for terminal display.
pub fn render_state(state: ServiceState) -> ColoredString {
    let label = state.to_string();
    match state {
        ServiceState::Healthy => label.bright_green(),
        ServiceState::Pending | ServiceState::Starting | ServiceState::Started => {
            label.bright_yellow()
        }
        ServiceState::Unhealthy | ServiceState::Failed => label.bright_red(),
        ServiceState::Stopping | ServiceState::Stopped => label.dimmed(),
    }
}
