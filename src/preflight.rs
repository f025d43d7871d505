//! Host checks run before each command

use crate::error::{FoundationError, Result};
use crate::runtime::ProcessConfig;
use tracing::debug;

/// Install command for Docker
pub const DOCKER_HINT: &str = "curl -fsSL https://get.docker.com | sh";
/// Install command for git
pub const GIT_HINT: &str =
    "curl -fsSL https://raw.githubusercontent.com/ElliottStorey/git-install/main/install.sh | sh";
/// Install command for railpack
pub const RAILPACK_HINT: &str = "curl -fsSL https://railpack.com/install.sh | sh";

/// What a command needs before it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Requirement {
    /// Nothing; the command sets things up itself
    Nothing,
    /// Tools present and the registry initialized
    Initialized,
    /// All of the above and the proxy core running
    Running,
}

/// Whether `program --version` runs
pub async fn tool_installed(program: &str) -> bool {
    ProcessConfig::new(program).arg("--version").succeeds().await
}

fn missing(tool: &str, hint: &str) -> FoundationError {
    FoundationError::ToolMissing {
        tool: tool.to_string(),
        hint: hint.to_string(),
    }
}

/// Tools `install` would have to set up, in install order
pub async fn missing_tools() -> Vec<FoundationError> {
    let mut missing_tools = Vec::new();
    for (tool, hint) in [("docker", DOCKER_HINT), ("git", GIT_HINT), ("railpack", RAILPACK_HINT)] {
        if !tool_installed(tool).await {
            missing_tools.push(missing(tool, hint));
        }
    }
    missing_tools
}

/// Interpret the result of `docker info`
pub fn docker_access(success: bool, stderr: &str) -> Result<()> {
    if success {
        Ok(())
    } else if stderr.to_ascii_lowercase().contains("permission denied") {
        Err(FoundationError::DockerPermissionDenied)
    } else {
        Err(FoundationError::DockerNotRunning)
    }
}

/// Check that docker and git are usable
pub async fn check_tools() -> Result<()> {
    if !tool_installed("docker").await {
        return Err(missing("docker", DOCKER_HINT));
    }

    let info = ProcessConfig::new("docker").arg("info").output().await?;
    docker_access(
        info.status.success(),
        &String::from_utf8_lossy(&info.stderr),
    )?;

    if !tool_installed("git").await {
        return Err(missing("git", GIT_HINT));
    }

    debug!("docker and git are available");
    Ok(())
}
