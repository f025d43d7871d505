//! Image building boundary
//!
//! Two ways to turn a source tree into an image: a plain build from the
//! tree's Dockerfile, or a plan produced by railpack and fed to a BuildKit
//! frontend. Both are delegated to external tools.

use crate::error::Result;
use crate::runtime::ProcessConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Buildx builder instance used for plan builds
pub const PLAN_BUILDER: &str = "railpack-builder";

/// BuildKit frontend that understands railpack plans
pub const PLAN_FRONTEND: &str = "ghcr.io/railwayapp/railpack-frontend";

/// Build context for image building
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Context directory
    pub context_dir: PathBuf,
    /// Build file or plan path
    pub build_file: PathBuf,
    /// Tag for the built image
    pub tag: String,
}

impl BuildContext {
    /// Create a new build context
    pub fn new(context_dir: &Path, build_file: &Path, tag: &str) -> Self {
        Self {
            context_dir: context_dir.to_path_buf(),
            build_file: build_file.to_path_buf(),
            tag: tag.to_string(),
        }
    }
}

/// External image builder
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `ctx.tag` from the Dockerfile at `ctx.build_file`
    async fn build_from_file(&self, ctx: &BuildContext) -> Result<()>;

    /// Write a build plan for `context_dir` to `plan_path`
    async fn plan_from_source(&self, context_dir: &Path, plan_path: &Path) -> Result<()>;

    /// Build `ctx.tag` from the plan at `ctx.build_file`
    async fn build_from_plan(&self, ctx: &BuildContext) -> Result<()>;
}

/// Docker and railpack backed builder
#[derive(Debug, Clone, Default)]
pub struct DockerImageBuilder;

impl DockerImageBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self
    }

    /// Select the plan builder, creating it on first use
    async fn ensure_plan_builder(&self) -> Result<()> {
        let selected = ProcessConfig::new("docker")
            .args(["buildx", "use", PLAN_BUILDER])
            .succeeds()
            .await;

        if !selected {
            info!("Creating buildx builder {}", PLAN_BUILDER);
            ProcessConfig::new("docker")
                .args(["buildx", "create", "--name", PLAN_BUILDER])
                .args(["--driver", "docker-container", "--use"])
                .run()
                .await?;
        }

        ProcessConfig::new("docker")
            .args(["buildx", "inspect", "--bootstrap"])
            .run()
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build_from_file(&self, ctx: &BuildContext) -> Result<()> {
        ProcessConfig::new("docker")
            .args(["build", "-t", ctx.tag.as_str(), "-f"])
            .arg(&ctx.build_file)
            .arg(&ctx.context_dir)
            .run()
            .await
            .map(|_| ())
    }

    async fn plan_from_source(&self, context_dir: &Path, plan_path: &Path) -> Result<()> {
        ProcessConfig::new("railpack")
            .arg("plan")
            .arg(context_dir)
            .arg("-o")
            .arg(plan_path)
            .run()
            .await
            .map(|_| ())
    }

    async fn build_from_plan(&self, ctx: &BuildContext) -> Result<()> {
        self.ensure_plan_builder().await?;

        ProcessConfig::new("docker")
            .args(["buildx", "build", "--build-arg"])
            .arg(format!("BUILDKIT_SYNTAX={}", PLAN_FRONTEND))
            .arg("-f")
            .arg(&ctx.build_file)
            .args(["--load", "-t", ctx.tag.as_str()])
            .arg(&ctx.context_dir)
            .run()
            .await
            .map(|_| ())
    }
}
