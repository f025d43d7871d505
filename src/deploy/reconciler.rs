//! Deployment reconciler
//!
//! One pass runs in four steps:
//!
//! 1. check that the requested service exists;
//! 2. sync and build every service in scope, recording failures per service;
//! 3. bring up the proxy core, aborting the pass if that fails;
//! 4. bring up the services that got through step 2.

use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::image::{BuildDispatcher, BuildOutcome, ImageBuilder};
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;
use crate::service::ServiceDefinition;
use crate::source::{is_working_tree, SourceKind, SyncOutcome, Synchronizer, Vcs};
use std::fmt;
use tracing::{info, warn};

/// Services a deploy pass covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every service in the registry
    All,
    /// One named service
    Service(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all services"),
            Scope::Service(name) => write!(f, "service '{}'", name),
        }
    }
}

/// What happened to one service during a pass
#[derive(Debug)]
pub struct ServiceReport {
    /// Service name
    pub name: String,
    /// Sync result, when the service has a working tree
    pub sync: Option<SyncOutcome>,
    /// Build result, when the dispatcher ran
    pub build: Option<BuildOutcome>,
    /// The failure that kept this service from starting
    pub error: Option<FoundationError>,
}

impl ServiceReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sync: None,
            build: None,
            error: None,
        }
    }

    /// Whether the service is ready to start
    pub fn is_ready(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a deploy or update pass
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Per-service results in registry order
    pub services: Vec<ServiceReport>,
    /// Whether the proxy core was brought up
    pub core_started: bool,
    /// Services handed to the runtime
    pub started: Vec<String>,
    /// Failure of the final runtime step
    pub start_error: Option<FoundationError>,
}

impl DeployReport {
    /// Every recorded failure
    pub fn failures(&self) -> impl Iterator<Item = &FoundationError> {
        self.services
            .iter()
            .filter_map(|s| s.error.as_ref())
            .chain(self.start_error.as_ref())
    }

    /// Whether nothing failed
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Drives sync, build and start for registry services
pub struct Reconciler<'a> {
    config: &'a FoundationConfig,
    registry: &'a Registry,
    vcs: &'a dyn Vcs,
    builder: &'a dyn ImageBuilder,
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over a loaded registry
    pub fn new(
        config: &'a FoundationConfig,
        registry: &'a Registry,
        vcs: &'a dyn Vcs,
        builder: &'a dyn ImageBuilder,
        runtime: &'a dyn ContainerRuntime,
    ) -> Self {
        Self {
            config,
            registry,
            vcs,
            builder,
            runtime,
        }
    }

    /// Run one deploy pass
    ///
    /// Fails only when the requested service does not exist or the proxy
    /// core cannot start. Everything else is recorded in the report.
    pub async fn deploy(&self, scope: &Scope) -> Result<DeployReport> {
        let names = self.target(scope)?;
        info!("Deploying {}", scope);

        let mut report = DeployReport::default();
        for name in &names {
            report.services.push(self.prepare(name, false).await);
        }

        println!("Ensuring foundation is running...");
        self.runtime
            .up(&self.config.core_compose_path(), &[], false)
            .await
            .map_err(|e| FoundationError::RuntimeStartFailed {
                scope: "the proxy core".to_string(),
                message: e.to_string(),
            })?;
        report.core_started = true;
        println!("Foundation is deployed.");

        let ready: Vec<String> = report
            .services
            .iter()
            .filter(|s| s.is_ready())
            .map(|s| s.name.clone())
            .collect();

        if ready.is_empty() {
            if names.is_empty() {
                println!("You have no defined services. Run `foundation create` to create a service.");
            }
            return Ok(report);
        }

        println!("Deploying {}...", describe(&ready));
        let remove_orphans = *scope == Scope::All;
        match self
            .runtime
            .up(&self.config.services_compose_path(), &ready, remove_orphans)
            .await
        {
            Ok(()) => {
                println!("Deployed {}.", describe(&ready));
                report.started = ready;
            }
            Err(e) => {
                report.start_error = Some(FoundationError::RuntimeStartFailed {
                    scope: describe(&ready),
                    message: e.to_string(),
                });
            }
        }

        Ok(report)
    }

    /// Pull upstream changes and refresh images without starting anything
    ///
    /// Git-tracked services are rebuilt only when their tree moved. Images of
    /// image-reference services are then pulled and compose-declared builds
    /// rebuilt. Self-built images exist only locally and are never pulled.
    pub async fn update(&self) -> Result<DeployReport> {
        let mut report = DeployReport::default();
        let mut pullable = Vec::new();
        for name in self.registry.service_names() {
            let from_registry = self
                .registry
                .definition(&name, self.config)
                .is_ok_and(|d| d.source_kind == SourceKind::ImageReference);
            if from_registry {
                pullable.push(name.clone());
            }
            report.services.push(self.prepare(&name, true).await);
        }

        let services_file = self.config.services_compose_path();
        let refreshed = async {
            if !pullable.is_empty() {
                println!("Pulling registry images...");
                self.runtime.pull(&services_file, &pullable).await?;
                println!("Pulled all registry images.");
            }
            println!("Building registry images...");
            self.runtime.build(&services_file).await?;
            println!("Built all registry images.");
            Ok::<_, FoundationError>(())
        }
        .await;

        if let Err(e) = refreshed {
            report.start_error = Some(e);
        }

        Ok(report)
    }

    fn target(&self, scope: &Scope) -> Result<Vec<String>> {
        match scope {
            Scope::All => Ok(self.registry.service_names()),
            Scope::Service(name) if self.registry.contains(name) => Ok(vec![name.clone()]),
            Scope::Service(name) => Err(FoundationError::UnknownService(name.clone())),
        }
    }

    /// Sync and build one service, capturing any failure in the report
    async fn prepare(&self, name: &str, only_if_updated: bool) -> ServiceReport {
        let mut report = ServiceReport::new(name);

        let definition = match self.registry.definition(name, self.config) {
            Ok(definition) => definition,
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        };

        if let Err(e) = self.sync_and_build(&definition, only_if_updated, &mut report).await {
            warn!("Skipping service '{}': {}", name, e);
            report.error = Some(e);
        }

        report
    }

    async fn sync_and_build(
        &self,
        definition: &ServiceDefinition,
        only_if_updated: bool,
        report: &mut ServiceReport,
    ) -> Result<()> {
        let tree = self.config.service_path(&definition.name);
        let tracked = definition.source_kind == SourceKind::GitTracked && is_working_tree(&tree);

        if tracked {
            println!("Checking service '{}' for changes...", definition.name);
            let outcome = Synchronizer::new(self.vcs)
                .sync(&definition.name, &tree)
                .await?;
            if outcome == SyncOutcome::Updated {
                println!("Pulled changes for service '{}'.", definition.name);
            }
            report.sync = Some(outcome);
        }

        if only_if_updated && report.sync != Some(SyncOutcome::Updated) {
            return Ok(());
        }

        let outcome = BuildDispatcher::new(self.config, self.builder)
            .resolve_and_build(definition)
            .await?;
        report.build = Some(outcome);

        Ok(())
    }
}

fn describe(names: &[String]) -> String {
    match names {
        [one] => format!("service '{}'", one),
        _ => format!("{} services", names.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::proxy::{proxy_core_document, services_document};
    use crate::image::BuildContext;
    use crate::runtime::ContainerState;
    use crate::service::{Environment, RestartPolicy};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records every call across all boundaries in order
    #[derive(Default)]
    struct Journal {
        calls: Mutex<Vec<String>>,
        core_fails: bool,
        fetch_fails_for: Option<String>,
        upstream_moved: bool,
        /// Images that exist only locally; pulling them fails
        local_only: Vec<String>,
    }

    impl Journal {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn tree_name(path: &Path) -> String {
            path.file_name().unwrap().to_string_lossy().to_string()
        }
    }

    #[async_trait]
    impl Vcs for Journal {
        async fn probe(&self, _remote: &str) -> bool {
            true
        }
        async fn clone_into(&self, _remote: &str, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn fetch(&self, path: &Path) -> Result<()> {
            let name = Self::tree_name(path);
            self.record(format!("fetch:{}", name));
            if self.fetch_fails_for.as_deref() == Some(name.as_str()) {
                return Err(FoundationError::Command {
                    command: "git fetch".to_string(),
                    stderr: "could not read from remote".to_string(),
                });
            }
            Ok(())
        }
        async fn local_rev(&self, _path: &Path) -> Result<String> {
            Ok("aaa".to_string())
        }
        async fn upstream_rev(&self, _path: &Path) -> Result<String> {
            Ok(if self.upstream_moved { "bbb" } else { "aaa" }.to_string())
        }
        async fn hard_reset_to_upstream(&self, path: &Path) -> Result<()> {
            self.record(format!("reset:{}", Self::tree_name(path)));
            Ok(())
        }
    }

    #[async_trait]
    impl ImageBuilder for Journal {
        async fn build_from_file(&self, ctx: &BuildContext) -> Result<()> {
            self.record(format!("build-file:{}", ctx.tag));
            Ok(())
        }
        async fn plan_from_source(&self, _context_dir: &Path, plan_path: &Path) -> Result<()> {
            std::fs::write(plan_path, "{}")?;
            Ok(())
        }
        async fn build_from_plan(&self, ctx: &BuildContext) -> Result<()> {
            self.record(format!("build-plan:{}", ctx.tag));
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerRuntime for Journal {
        async fn validate(&self, _compose_file: &Path) -> Result<()> {
            Ok(())
        }
        async fn up(&self, compose_file: &Path, services: &[String], remove_orphans: bool) -> Result<()> {
            let doc = if compose_file.ends_with("services/compose.json") {
                "services"
            } else {
                "core"
            };
            self.record(format!("up:{}:{}:{}", doc, services.join(","), remove_orphans));
            if doc == "core" && self.core_fails {
                return Err(FoundationError::Command {
                    command: "docker compose up".to_string(),
                    stderr: "port 80 is already allocated".to_string(),
                });
            }
            Ok(())
        }
        async fn pull(&self, _compose_file: &Path, services: &[String]) -> Result<()> {
            self.record(format!("pull:{}", services.join(",")));
            if let Some(name) = services.iter().find(|s| self.local_only.contains(s)) {
                return Err(FoundationError::Command {
                    command: "docker compose pull".to_string(),
                    stderr: format!("pull access denied for foundation/{}", name),
                });
            }
            Ok(())
        }
        async fn build(&self, _compose_file: &Path) -> Result<()> {
            self.record("compose-build".to_string());
            Ok(())
        }
        async fn ps(&self, _compose_file: &Path) -> Result<BTreeMap<String, ContainerState>> {
            Ok(BTreeMap::new())
        }
        async fn remove_container(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    fn definition(config: &FoundationConfig, name: &str, image: Option<&str>) -> ServiceDefinition {
        let (source_kind, image) = match image {
            Some(image) => (SourceKind::ImageReference, image.to_string()),
            None => (SourceKind::GitTracked, config.image_tag(name)),
        };
        ServiceDefinition {
            name: name.to_string(),
            source_kind,
            image,
            environment: Environment::new(),
            volumes: Vec::new(),
            network: config.network.clone(),
            restart: RestartPolicy::UnlessStopped,
            accelerator: false,
        }
    }

    fn registry_with(definitions: &[ServiceDefinition]) -> Registry {
        let mut registry = Registry::new(
            proxy_core_document("foundation_network", None),
            services_document("foundation_network", None),
        );
        for def in definitions {
            registry.insert(def).unwrap();
        }
        registry
    }

    fn git_tree(config: &FoundationConfig, name: &str, dockerfile: bool) {
        let tree = config.service_path(name);
        std::fs::create_dir_all(tree.join(".git")).unwrap();
        if dockerfile {
            std::fs::write(tree.join("Dockerfile"), "FROM scratch\n").unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_sync_does_not_block_siblings() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        git_tree(&config, "a", true);
        git_tree(&config, "b", false);
        let registry = registry_with(&[definition(&config, "a", None), definition(&config, "b", None)]);

        let journal = Journal {
            fetch_fails_for: Some("b".to_string()),
            ..Default::default()
        };
        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let report = reconciler.deploy(&Scope::All).await.unwrap();

        assert_eq!(
            journal.calls(),
            vec![
                "fetch:a".to_string(),
                "build-file:foundation/a".to_string(),
                "fetch:b".to_string(),
                "up:core::false".to_string(),
                "up:services:a:true".to_string(),
            ]
        );
        assert!(report.core_started);
        assert_eq!(report.started, vec!["a".to_string()]);
        assert!(!report.is_success());
        assert!(matches!(
            report.failures().next(),
            Some(FoundationError::SyncFailed { service, .. }) if service == "b"
        ));
    }

    #[tokio::test]
    async fn test_unknown_service_has_no_side_effects() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        let registry = registry_with(&[]);
        let journal = Journal::default();

        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let err = reconciler
            .deploy(&Scope::Service("api".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, FoundationError::UnknownService(_)));
        assert!(journal.calls().is_empty());
    }

    #[tokio::test]
    async fn test_core_failure_aborts_before_services() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        let registry = registry_with(&[definition(&config, "cache", Some("redis:7"))]);
        let journal = Journal {
            core_fails: true,
            ..Default::default()
        };

        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let err = reconciler.deploy(&Scope::All).await.unwrap_err();

        assert!(matches!(err, FoundationError::RuntimeStartFailed { .. }));
        assert_eq!(journal.calls(), vec!["up:core::false".to_string()]);
    }

    #[tokio::test]
    async fn test_single_service_scope_keeps_orphans() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        let registry = registry_with(&[
            definition(&config, "cache", Some("redis:7")),
            definition(&config, "db", Some("postgres:16")),
        ]);
        let journal = Journal::default();

        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let report = reconciler
            .deploy(&Scope::Service("cache".to_string()))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            journal.calls(),
            vec!["up:core::false".to_string(), "up:services:cache:false".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_registry_starts_core_only() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        let registry = registry_with(&[]);
        let journal = Journal::default();

        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let report = reconciler.deploy(&Scope::All).await.unwrap();

        assert!(report.is_success());
        assert!(report.started.is_empty());
        assert_eq!(journal.calls(), vec!["up:core::false".to_string()]);
    }

    #[tokio::test]
    async fn test_update_rebuilds_only_moved_trees() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        git_tree(&config, "api", true);
        let registry = registry_with(&[
            definition(&config, "api", None),
            definition(&config, "cache", Some("redis:7")),
        ]);

        let journal = Journal {
            local_only: vec!["api".to_string()],
            ..Default::default()
        };
        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let report = reconciler.update().await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            journal.calls(),
            vec![
                "fetch:api".to_string(),
                "pull:cache".to_string(),
                "compose-build".to_string()
            ]
        );

        let moved = Journal {
            upstream_moved: true,
            local_only: vec!["api".to_string()],
            ..Default::default()
        };
        let reconciler = Reconciler::new(&config, &registry, &moved, &moved, &moved);
        let report = reconciler.update().await.unwrap();
        assert_eq!(report.services[0].sync, Some(SyncOutcome::Updated));
        assert_eq!(
            moved.calls(),
            vec![
                "fetch:api".to_string(),
                "reset:api".to_string(),
                "build-file:foundation/api".to_string(),
                "pull:cache".to_string(),
                "compose-build".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_never_pulls_self_built_images() {
        let temp = tempdir().unwrap();
        let config = FoundationConfig::new(temp.path().to_path_buf());
        git_tree(&config, "api", true);
        git_tree(&config, "web", false);
        let registry = registry_with(&[definition(&config, "api", None), definition(&config, "web", None)]);

        let journal = Journal {
            local_only: vec!["api".to_string(), "web".to_string()],
            ..Default::default()
        };
        let reconciler = Reconciler::new(&config, &registry, &journal, &journal, &journal);
        let report = reconciler.update().await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            journal.calls(),
            vec![
                "fetch:api".to_string(),
                "fetch:web".to_string(),
                "compose-build".to_string()
            ]
        );
    }
}
