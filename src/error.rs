//! Error types for Foundation

use thiserror::Error;

/// Result type for Foundation operations
pub type Result<T> = std::result::Result<T, FoundationError>;

/// Foundation error types
#[derive(Error, Debug)]
pub enum FoundationError {
    #[error("the given source '{0}' is not a valid git repo or docker image")]
    ClassificationFailed(String),

    #[error("service '{0}' already exists")]
    DuplicateName(String),

    #[error("service '{0}' not found")]
    UnknownService(String),

    #[error("invalid service name '{0}': use letters, digits, '_', '.' or '-'")]
    InvalidServiceName(String),

    #[error("volume name must not be a path: '{0}'")]
    InvalidVolumeName(String),

    #[error("invalid volume mapping '{0}': expected NAME:PATH")]
    InvalidVolumePair(String),

    #[error("invalid environment variable '{0}': expected KEY=VALUE")]
    InvalidEnvPair(String),

    #[error("failed to fetch source '{source_ref}': {message}")]
    SourceFetchFailed { source_ref: String, message: String },

    #[error("failed to sync service '{service}': {message}")]
    SyncFailed { service: String, message: String },

    #[error("failed to build image for service '{service}': {message}")]
    BuildFailed { service: String, message: String },

    #[error("Build error: {0}")]
    Build(String),

    #[error("failed to start {scope}: {message}")]
    RuntimeStartFailed { scope: String, message: String },

    #[error("configuration is corrupted: {0}")]
    ConfigCorrupted(String),

    #[error("Foundation is not initialized")]
    NotInitialized,

    #[error("Foundation is not running")]
    NotRunning,

    #[error("{tool} is not installed")]
    ToolMissing { tool: String, hint: String },

    #[error("Docker is not running. Please start the Docker service and try again")]
    DockerNotRunning,

    #[error("permission denied while accessing Docker")]
    DockerPermissionDenied,

    #[error("command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

impl FoundationError {
    /// The literal command that fixes this error, where one exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            FoundationError::DuplicateName(name) => {
                Some(format!("foundation delete {}", name))
            }
            FoundationError::UnknownService(_) => Some("foundation status".to_string()),
            FoundationError::NotInitialized | FoundationError::ConfigCorrupted(_) => {
                Some("foundation install".to_string())
            }
            FoundationError::NotRunning | FoundationError::RuntimeStartFailed { .. } => {
                Some("foundation deploy".to_string())
            }
            FoundationError::ToolMissing { hint, .. } => Some(hint.clone()),
            FoundationError::SyncFailed { service, .. } => Some(format!(
                "foundation delete {0} && foundation create {0} --source <source>",
                service
            )),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for FoundationError {
    fn from(err: serde_yaml::Error) -> Self {
        FoundationError::Yaml(err.to_string())
    }
}
