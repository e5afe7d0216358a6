//! CLI definitions for capstan
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "capstan",
    version,
    about = "Stack orchestrator for compose-style multi-service deployments",
    long_about = "Brings a declared service stack up in dependency order with health\ngating, supervises restarts, and tears it down behind a join barrier."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a stack manifest and print the resolved start order
    Validate {
        /// Path to the stack manifest
        #[arg(short, long, default_value = "stack.yaml")]
        file: String,
    },

    /// Print the fully resolved manifest
    Config {
        /// Path to the stack manifest
        #[arg(short, long, default_value = "stack.yaml")]
        file: String,
    },

    /// Bring the stack up and supervise it in the foreground
    Up {
        /// Path to the stack manifest
        #[arg(short, long, default_value = "stack.yaml")]
        file: String,

        /// Where to write run-time state snapshots
        #[arg(long, env = "CAPSTAN_STATE_FILE")]
        state_file: Option<String>,
    },

    /// Tear down a previously started stack
    Down {
        /// Path to the stack manifest
        #[arg(short, long, default_value = "stack.yaml")]
        file: String,

        /// Also remove named volumes (they are never removed otherwise)
        #[arg(long)]
        volumes: bool,
    },

    /// Show the last recorded state of the stack
    Status {
        /// State snapshot file written by `up`
        #[arg(long, env = "CAPSTAN_STATE_FILE")]
        state_file: Option<String>,
    },
}
