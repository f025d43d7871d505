//! Build dispatch
//!
//! Decides per service whether to build from a Dockerfile, build from a
//! railpack plan, or leave the image to the runtime's pull. Rules, in order:
//!
//! 1. a build file at the root of a git-tracked working tree wins;
//! 2. a self-built service (`<namespace>/<name>`) without one gets a plan build;
//! 3. anything else is pulled.

use super::builder::{BuildContext, ImageBuilder};
use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::service::ServiceDefinition;
use crate::source::{is_working_tree, SourceKind};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Strategy chosen for a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAction {
    /// Build from the build file found at the source root
    BuildFile { context: PathBuf, build_file: PathBuf },
    /// Plan the source tree and build from the plan
    Plan { context: PathBuf },
    /// No build; the runtime pulls the image
    Pull,
}

/// What the dispatcher did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// An image was built and tagged
    Built { tag: String, from_plan: bool },
    /// Nothing was built
    Pulled,
}

/// Build dispatcher
pub struct BuildDispatcher<'a> {
    config: &'a FoundationConfig,
    builder: &'a dyn ImageBuilder,
}

impl<'a> BuildDispatcher<'a> {
    /// Create a dispatcher
    pub fn new(config: &'a FoundationConfig, builder: &'a dyn ImageBuilder) -> Self {
        Self { config, builder }
    }

    /// Pick the build strategy for a service
    pub fn action(&self, service: &ServiceDefinition) -> BuildAction {
        let context = self.config.service_path(&service.name);
        let build_file = self.config.build_file_at(&context);
        let tracked = service.source_kind == SourceKind::GitTracked && is_working_tree(&context);

        if tracked && build_file.is_file() {
            BuildAction::BuildFile { context, build_file }
        } else if service.image == self.config.image_tag(&service.name) {
            BuildAction::Plan { context }
        } else {
            BuildAction::Pull
        }
    }

    /// Build the image for a service if it needs one
    pub async fn resolve_and_build(&self, service: &ServiceDefinition) -> Result<BuildOutcome> {
        let tag = self.config.image_tag(&service.name);

        let result = match self.action(service) {
            BuildAction::BuildFile { context, build_file } => {
                println!("Building image for service '{}'...", service.name);
                self.builder
                    .build_from_file(&BuildContext::new(&context, &build_file, &tag))
                    .await
                    .map(|_| BuildOutcome::Built {
                        tag: tag.clone(),
                        from_plan: false,
                    })
            }
            BuildAction::Plan { context } => {
                println!(
                    "Dockerfile not detected for service '{}'. Building image using railpack...",
                    service.name
                );
                self.build_from_plan(&service.name, &context, &tag)
                    .await
                    .map(|_| BuildOutcome::Built {
                        tag: tag.clone(),
                        from_plan: true,
                    })
            }
            BuildAction::Pull => return Ok(BuildOutcome::Pulled),
        };

        match result {
            Ok(outcome) => {
                println!("Built image for service '{}'.", service.name);
                Ok(outcome)
            }
            Err(e) => Err(FoundationError::BuildFailed {
                service: service.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    async fn build_from_plan(&self, name: &str, context: &Path, tag: &str) -> Result<()> {
        if !context.is_dir() {
            return Err(FoundationError::Build(format!(
                "working tree {} is missing",
                context.display()
            )));
        }

        let plan_path = context.join(format!("{}-railpack-plan.json", name));

        let result = async {
            self.builder.plan_from_source(context, &plan_path).await?;
            self.builder
                .build_from_plan(&BuildContext::new(context, &plan_path, tag))
                .await
        }
        .await;

        if let Err(e) = std::fs::remove_file(&plan_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove plan {}: {}", plan_path.display(), e);
            }
        }

        result
    }
}
