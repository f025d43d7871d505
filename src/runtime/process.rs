//! External tool invocation
//!
//! Every call to `git`, `docker` or `railpack` goes through [`ProcessConfig`],
//! so failures come back as a [`FoundationError`] carrying the tool's stderr
//! instead of being swallowed.

use crate::error::{FoundationError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Configuration for a single external command
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<OsString>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Upper bound on run time
    pub timeout: Option<Duration>,
}

impl ProcessConfig {
    /// Create a new process config for the given program
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable command line
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion and return the raw output, whatever the exit status
    pub async fn output(&self) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        debug!("Running: {}", self.display());

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| FoundationError::Timeout {
                    command: self.display(),
                    seconds: limit.as_secs(),
                })??,
            None => cmd.output().await?,
        };

        Ok(output)
    }

    /// Run and return trimmed stdout, failing on a non-zero exit
    pub async fn run(&self) -> Result<String> {
        let output = self.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FoundationError::Command {
                command: self.display(),
                stderr: if stderr.is_empty() {
                    format!("exit code {}", output.status.code().unwrap_or(-1))
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether the command runs and exits successfully
    pub async fn succeeds(&self) -> bool {
        match self.output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("{} did not succeed: {}", self.display(), e);
                false
            }
        }
    }
}
