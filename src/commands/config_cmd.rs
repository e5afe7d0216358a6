//! Print the fully resolved manifest
//!
//! Interpolates every variable against the environment, runs the typed
//! validation pipeline, and echoes the resulting document. Useful to see
//! exactly what `up` would deploy.

use crate::config;
use anyhow::Result;
use std::path::PathBuf;

pub async fn execute(file: String) -> Result<()> {
    let path = PathBuf::from(&file);
    let rendered = config::resolved_yaml(&path)?;
    print!("{rendered}");
    Ok(())
}
