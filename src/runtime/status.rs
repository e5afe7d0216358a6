//! Persisted state snapshots
//!
//! `up` writes one JSON document per transition; `status` renders the
//! latest. This is the out-of-process view of a running stack.

use crate::domain::ServiceState;
use crate::runtime::StackSnapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct StateFile {
    pub stack: String,
    /// RFC 3339 timestamp of the last transition
    pub updated_at: String,
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub restarts: u32,
    pub bring_up_failed: bool,
}

/// Write the snapshot, creating parent directories as needed.
pub fn write(path: &Path, stack: &str, snapshot: &StackSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let state = StateFile {
        stack: stack.to_string(),
        updated_at: chrono::Utc::now().to_rfc3339(),
        services: snapshot
            .services
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    ServiceStatus {
                        state: s.state,
                        restarts: s.restart_count,
                        bring_up_failed: s.bring_up_failed,
                    },
                )
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write state file: {}", path.display()))
}

pub fn read(path: &Path) -> Result<StateFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::InstanceSnapshot;

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut snapshot = StackSnapshot::default();
        snapshot.services.insert(
            "db".to_string(),
            InstanceSnapshot {
                state: ServiceState::Healthy,
                restart_count: 2,
                bring_up_failed: false,
            },
        );

        write(&path, "erp", &snapshot).unwrap();
        let state = read(&path).unwrap();

        assert_eq!(state.stack, "erp");
        assert_eq!(state.services["db"].state, ServiceState::Healthy);
        assert_eq!(state.services["db"].restarts, 2);
    }

    #[test]
    fn test_read_missing_file_has_context() {
        let err = read(Path::new("/nonexistent/state.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/state.json"));
    }
}
