//! Docker Compose backed runtime

use super::process::ProcessConfig;
use super::{ContainerRuntime, ContainerState};
use crate::error::{FoundationError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Runtime driving `docker compose`
#[derive(Debug, Clone, Default)]
pub struct DockerCompose;

impl DockerCompose {
    /// Create a new runtime handle
    pub fn new() -> Self {
        Self
    }

    fn compose(compose_file: &Path) -> ProcessConfig {
        ProcessConfig::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(compose_file)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn validate(&self, compose_file: &Path) -> Result<()> {
        Self::compose(compose_file)
            .args(["config", "--quiet"])
            .run()
            .await
            .map(|_| ())
            .map_err(|e| FoundationError::ConfigCorrupted(e.to_string()))
    }

    async fn up(
        &self,
        compose_file: &Path,
        services: &[String],
        remove_orphans: bool,
    ) -> Result<()> {
        let mut cmd = Self::compose(compose_file).args(["up", "-d"]);
        if remove_orphans {
            cmd = cmd.arg("--remove-orphans");
        }
        cmd.args(services).run().await.map(|_| ())
    }

    async fn pull(&self, compose_file: &Path, services: &[String]) -> Result<()> {
        Self::compose(compose_file)
            .args(["pull", "--ignore-buildable"])
            .args(services)
            .run()
            .await
            .map(|_| ())
    }

    async fn build(&self, compose_file: &Path) -> Result<()> {
        Self::compose(compose_file).arg("build").run().await.map(|_| ())
    }

    async fn ps(&self, compose_file: &Path) -> Result<BTreeMap<String, ContainerState>> {
        let stdout = Self::compose(compose_file)
            .args(["ps", "-a", "--format", "json"])
            .run()
            .await?;
        parse_ps_output(&stdout)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let output = ProcessConfig::new("docker")
            .args(["rm", "-f", name])
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") {
            debug!("Container {} already gone", name);
            return Ok(());
        }
        Err(FoundationError::Command {
            command: format!("docker rm -f {}", name),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Parse `docker compose ps --format json` output
///
/// Older compose releases print one JSON array, newer ones one object per
/// line. Both are accepted.
pub fn parse_ps_output(stdout: &str) -> Result<BTreeMap<String, ContainerState>> {
    let trimmed = stdout.trim();
    let states: Vec<ContainerState> = if trimmed.is_empty() {
        Vec::new()
    } else if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<ContainerState>)
            .collect::<std::result::Result<_, _>>()?
    };

    Ok(states
        .into_iter()
        .map(|state| (state.service.clone(), state))
        .collect())
}
