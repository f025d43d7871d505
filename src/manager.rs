//! Service manager
//!
//! The entry point for every command. Each operation loads the registry
//! once, works on the in-memory value and persists it at most once.

use crate::compose::ComposeParser;
use crate::config::FoundationConfig;
use crate::deploy::{DeployReport, Reconciler, Scope};
use crate::error::{FoundationError, Result};
use crate::image::{DockerImageBuilder, DockerManifestProbe, ImageBuilder};
use crate::preflight::{self, Requirement};
use crate::registry::{Registry, RegistryStore};
use crate::runtime::{ContainerRuntime, DockerCompose};
use crate::service::{CreateRequest, ServiceDefinitionBuilder};
use crate::source::{self, GitCli, ImageProbe, SourceRef, Vcs};
use tracing::{info, warn};

/// External tools the manager drives
pub struct Toolchain {
    /// Version control client
    pub vcs: Box<dyn Vcs>,
    /// Image registry probe
    pub images: Box<dyn ImageProbe>,
    /// Image builder
    pub builder: Box<dyn ImageBuilder>,
    /// Container runtime
    pub runtime: Box<dyn ContainerRuntime>,
}

impl Toolchain {
    /// The git and docker CLIs on this host
    pub fn system(config: &FoundationConfig) -> Self {
        Self {
            vcs: Box::new(GitCli::new(config.probe_timeout)),
            images: Box::new(DockerManifestProbe::new(config.probe_timeout)),
            builder: Box::new(DockerImageBuilder::new()),
            runtime: Box::new(DockerCompose::new()),
        }
    }
}

/// One row of `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Service name
    pub name: String,
    /// Container creation time, if a container exists
    pub created: Option<String>,
    /// Container state, if a container exists
    pub state: Option<String>,
    /// Routed domain, if any
    pub domain: Option<String>,
}

impl ServiceStatus {
    /// Whether the container is running
    pub fn is_running(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("running"))
    }
}

/// Service manager
pub struct ServiceManager {
    config: FoundationConfig,
    tools: Toolchain,
}

impl ServiceManager {
    /// Create a manager over the given tools
    pub fn new(config: FoundationConfig, tools: Toolchain) -> Self {
        Self { config, tools }
    }

    /// Configuration in use
    pub fn config(&self) -> &FoundationConfig {
        &self.config
    }

    fn store(&self) -> RegistryStore<'_> {
        RegistryStore::new(&self.config)
    }

    fn reconciler<'a>(&'a self, registry: &'a Registry) -> Reconciler<'a> {
        Reconciler::new(
            &self.config,
            registry,
            self.tools.vcs.as_ref(),
            self.tools.builder.as_ref(),
            self.tools.runtime.as_ref(),
        )
    }

    /// Check that the host and registry are ready for a command
    pub async fn preflight(&self, requirement: Requirement) -> Result<()> {
        if requirement == Requirement::Nothing {
            return Ok(());
        }

        preflight::check_tools().await?;
        self.store().load()?;

        if requirement >= Requirement::Running && !self.core_running().await? {
            return Err(FoundationError::NotRunning);
        }
        Ok(())
    }

    /// Write the proxy core and services documents, then deploy everything
    pub async fn install(&self, default_email: Option<&str>) -> Result<DeployReport> {
        let registry = self
            .store()
            .initialize(default_email, self.tools.runtime.as_ref())
            .await?;
        println!("Installed foundation. Run `foundation create` to create a new service.");

        self.reconciler(&registry).deploy(&Scope::All).await
    }

    /// Create a service and deploy it
    ///
    /// Every input check runs before the source is probed or cloned. A clone
    /// whose registry entry cannot be persisted is removed again.
    pub async fn create(&self, request: &CreateRequest) -> Result<DeployReport> {
        let store = self.store();
        let mut registry = store.load()?;

        let builder = ServiceDefinitionBuilder::new(&self.config);
        let draft = builder.validate(&registry, request)?;

        let source = source::resolve(
            request.source.trim(),
            self.tools.vcs.as_ref(),
            self.tools.images.as_ref(),
        )
        .await?;
        info!("Source '{}' is a {}", source.as_str(), source.kind());

        let definition = builder.build(draft, &source, self.tools.vcs.as_ref()).await?;
        let name = definition.name.clone();

        let persisted = match registry.insert(&definition) {
            Ok(introduced) => {
                for volume in &introduced {
                    info!("Declared volume '{}'", volume);
                }
                store.persist(&registry, self.tools.runtime.as_ref()).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = persisted {
            if matches!(source, SourceRef::GitRemote(_)) {
                self.remove_tree(&name);
            }
            return Err(e);
        }

        self.reconciler(&registry)
            .deploy(&Scope::Service(name))
            .await
    }

    /// Remove a service, its container and its working tree
    pub async fn delete(&self, name: &str) -> Result<DeployReport> {
        let store = self.store();
        let mut registry = store.load()?;

        registry.remove(name)?;
        println!("Deleting service '{}'...", name);
        store.persist(&registry, self.tools.runtime.as_ref()).await?;
        println!("Deleted service '{}'.", name);

        if let Err(e) = self.tools.runtime.remove_container(name).await {
            warn!("Failed to remove container '{}': {}", name, e);
        }

        let report = self.reconciler(&registry).deploy(&Scope::All).await;

        println!("Cleaning up files for service '{}'...", name);
        self.remove_tree(name);
        println!("Cleaned up files for service '{}'.", name);

        report
    }

    /// Deploy one service or all of them
    pub async fn deploy(&self, name: Option<&str>) -> Result<DeployReport> {
        let registry = self.store().load()?;
        let scope = match name {
            Some(name) => Scope::Service(name.to_string()),
            None => Scope::All,
        };
        self.reconciler(&registry).deploy(&scope).await
    }

    /// Pull upstream changes and refresh images
    pub async fn update(&self) -> Result<DeployReport> {
        let registry = self.store().load()?;
        let report = self.reconciler(&registry).update().await?;
        println!("All changes have been pulled. Run `foundation deploy` to deploy them.");
        Ok(report)
    }

    /// Container state for every registry service
    pub async fn status(&self) -> Result<Vec<ServiceStatus>> {
        let registry = self.store().load()?;
        let states = self
            .tools
            .runtime
            .ps(&self.config.services_compose_path())
            .await?;

        registry
            .service_names()
            .into_iter()
            .map(|name| {
                let definition = registry.definition(&name, &self.config)?;
                let state = states.get(&name);
                Ok(ServiceStatus {
                    created: state.map(|s| s.created_at.clone()),
                    state: state.map(|s| s.state.clone()),
                    domain: definition.domain().map(str::to_string),
                    name,
                })
            })
            .collect()
    }

    /// Both documents rendered as YAML
    pub fn config_yaml(&self) -> Result<String> {
        let registry = self.store().load()?;
        let core = serde_yaml::to_string(&registry.core)?;
        let services = serde_yaml::to_string(&registry.services)?;
        Ok(format!(
            "# {}\n{}---\n# {}\n{}",
            self.config.core_compose_path().display(),
            core,
            self.config.services_compose_path().display(),
            services
        ))
    }

    /// Whether every proxy core service reports running
    pub async fn core_running(&self) -> Result<bool> {
        let core = ComposeParser::parse_file(&self.config.core_compose_path())?;
        let states = self
            .tools
            .runtime
            .ps(&self.config.core_compose_path())
            .await?;

        Ok(core
            .services
            .keys()
            .all(|name| states.get(name).is_some_and(|s| s.is_running())))
    }

    fn remove_tree(&self, name: &str) {
        let path = self.config.service_path(name);
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
