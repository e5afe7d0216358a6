//! Centralized error types for capstan
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for capstan operations
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Definition-time errors: detected at manifest load/validation,
/// before any service starts. All of these are fatal and block the
/// entire deployment.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Required variables not provided: {}. Set them in the environment before deploying", names.join(", "))]
    MissingVariables { names: Vec<String> },

    #[error("Bad substitution in '{value}': {reason}")]
    BadSubstitution { value: String, reason: String },

    #[error("Service '{service}' depends on undeclared service '{target}'")]
    UnknownDependency { service: String, target: String },

    #[error("Dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Service '{service}' mounts undeclared volume '{volume}'")]
    UnknownVolume { service: String, volume: String },

    #[error("Service '{service}' joins undeclared network '{network}'")]
    UnknownNetwork { service: String, network: String },

    #[error("Invalid health check for '{service}': {reason}")]
    InvalidHealthCheck { service: String, reason: String },

    #[error("Unsupported restart policy '{value}' for '{service}'. Supported: no, on-failure[:max-retries]")]
    UnsupportedRestartPolicy { service: String, value: String },

    #[error("Invalid port binding '{value}' for '{service}'. Expected [bind:]host:container")]
    InvalidPort { service: String, value: String },

    #[error("Invalid volume mount '{value}' for '{service}'. Expected source:target[:ro]")]
    InvalidMount { service: String, value: String },

    #[error("Invalid duration '{value}' for '{service}': {reason}")]
    InvalidDuration {
        service: String,
        value: String,
        reason: String,
    },

    #[error("Manifest declares no services")]
    NoServices,
}

/// Container engine invocation errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Container engine binary '{binary}' not found in PATH")]
    BinaryNotFound { binary: String },

    #[error("{command} failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from {command}: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Orchestration-time errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Illegal transition for '{service}': {from} -> {to}")]
    IllegalTransition {
        service: String,
        from: crate::domain::ServiceState,
        to: crate::domain::ServiceState,
    },

    #[error("Unknown service '{service}' in runtime registry")]
    UnknownService { service: String },

    #[error("Bring-up failed for: {}", services.join(", "))]
    BringUpFailed { services: Vec<String> },
}
