//! Container runtime boundary
//!
//! Foundation only produces compose documents and asks the runtime to act on
//! them. The runtime itself (Docker and its compose executor) is external.

pub mod docker;
pub mod process;

pub use docker::DockerCompose;
pub use process::ProcessConfig;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Reported state of one service's container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    /// Compose service name
    #[serde(default)]
    pub service: String,
    /// Machine state, e.g. `running` or `exited`
    #[serde(default)]
    pub state: String,
    /// Human status, e.g. `Up 3 hours`
    #[serde(default)]
    pub status: String,
    /// Creation timestamp as reported by the runtime
    #[serde(default)]
    pub created_at: String,
}

impl ContainerState {
    /// Whether the container is running
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Declarative container executor
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime accepts a compose document
    async fn validate(&self, compose_file: &Path) -> Result<()>;

    /// Bring up `services` from a compose document, or every service when empty
    async fn up(&self, compose_file: &Path, services: &[String], remove_orphans: bool)
        -> Result<()>;

    /// Pull the registry images of `services` from a compose document
    async fn pull(&self, compose_file: &Path, services: &[String]) -> Result<()>;

    /// Build images declared with `build` in a compose document
    async fn build(&self, compose_file: &Path) -> Result<()>;

    /// Per-service container state, keyed by service name
    async fn ps(&self, compose_file: &Path) -> Result<BTreeMap<String, ContainerState>>;

    /// Stop and remove a container by name, if it exists
    async fn remove_container(&self, name: &str) -> Result<()>;
}
