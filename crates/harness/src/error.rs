//! Error types for the harness

use thiserror::Error;

use crate::server::ProcessState;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Build failed: {0}")]
    BuildFailure(String),

    #[error("Server failed to start: {0}")]
    StartupFailure(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: ProcessState, to: ProcessState },

    #[error("Port {0} is still held by another server instance")]
    PortInUse(u16),

    #[error("Suite parse error: {0}")]
    SuiteParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
