//! Version control boundary

use crate::error::Result;
use crate::runtime::ProcessConfig;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Upstream ref of the checked-out branch
const UPSTREAM: &str = "@{u}";

/// Capabilities Foundation needs from a version control client
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Whether `remote` is a reachable repository
    async fn probe(&self, remote: &str) -> bool;

    /// Clone `remote` into `path`
    async fn clone_into(&self, remote: &str, path: &Path) -> Result<()>;

    /// Fetch remote refs for the tree at `path`
    async fn fetch(&self, path: &Path) -> Result<()>;

    /// Revision currently checked out
    async fn local_rev(&self, path: &Path) -> Result<String>;

    /// Revision of the tracked upstream ref
    async fn upstream_rev(&self, path: &Path) -> Result<String>;

    /// Discard local state and move the tree to the upstream ref
    async fn hard_reset_to_upstream(&self, path: &Path) -> Result<()>;
}

/// `git` command line client
#[derive(Debug, Clone)]
pub struct GitCli {
    probe_timeout: Duration,
}

impl GitCli {
    /// Create a client whose probes give up after `probe_timeout`
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    fn git(path: &Path) -> ProcessConfig {
        ProcessConfig::new("git").cwd(path)
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn probe(&self, remote: &str) -> bool {
        ProcessConfig::new("git")
            .args(["ls-remote", remote])
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes")
            .timeout(self.probe_timeout)
            .succeeds()
            .await
    }

    async fn clone_into(&self, remote: &str, path: &Path) -> Result<()> {
        ProcessConfig::new("git")
            .args(["clone", "--", remote])
            .arg(path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .run()
            .await
            .map(|_| ())
    }

    async fn fetch(&self, path: &Path) -> Result<()> {
        Self::git(path).arg("fetch").run().await.map(|_| ())
    }

    async fn local_rev(&self, path: &Path) -> Result<String> {
        Self::git(path).args(["rev-parse", "HEAD"]).run().await
    }

    async fn upstream_rev(&self, path: &Path) -> Result<String> {
        Self::git(path).args(["rev-parse", UPSTREAM]).run().await
    }

    async fn hard_reset_to_upstream(&self, path: &Path) -> Result<()> {
        Self::git(path)
            .args(["reset", "--hard", UPSTREAM])
            .run()
            .await
            .map(|_| ())
    }
}

/// Whether `path` holds a tracked working tree
pub fn is_working_tree(path: &Path) -> bool {
    path.join(".git").is_dir()
}
