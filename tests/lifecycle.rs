//! End-to-end service lifecycle against in-memory tools

use async_trait::async_trait;
use foundation::compose::config::EnvironmentConfig;
use foundation::error::{FoundationError, Result};
use foundation::image::{BuildContext, ImageBuilder};
use foundation::registry::{Registry, RegistryStore};
use foundation::runtime::{ContainerRuntime, ContainerState};
use foundation::service::{CreateRequest, RestartPolicy};
use foundation::source::{ImageProbe, Vcs};
use foundation::{FoundationConfig, ServiceManager, Toolchain};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct State {
    calls: Mutex<Vec<String>>,
    failing_fetch: Mutex<Vec<String>>,
    reject_writes: AtomicBool,
}

/// One fake standing in for git, the registry, the builder and compose
#[derive(Clone, Default)]
struct Fake(Arc<State>);

impl Fake {
    fn record(&self, call: impl Into<String>) {
        self.0.calls.lock().unwrap().push(call.into());
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.calls.lock().unwrap())
    }

    fn fail_fetch(&self, name: &str) {
        self.0.failing_fetch.lock().unwrap().push(name.to_string());
    }

    fn tree(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().to_string()
    }
}

#[async_trait]
impl Vcs for Fake {
    async fn probe(&self, remote: &str) -> bool {
        self.record(format!("probe:{}", remote));
        remote.starts_with("https://")
    }

    async fn clone_into(&self, remote: &str, path: &Path) -> Result<()> {
        self.record(format!("clone:{}", remote));
        std::fs::create_dir_all(path.join(".git"))?;
        if remote.contains("dockerfile") {
            std::fs::write(path.join("Dockerfile"), "FROM scratch\n")?;
        }
        Ok(())
    }

    async fn fetch(&self, path: &Path) -> Result<()> {
        let name = Self::tree(path);
        self.record(format!("fetch:{}", name));
        if self.0.failing_fetch.lock().unwrap().contains(&name) {
            return Err(FoundationError::Command {
                command: "git fetch".to_string(),
                stderr: "fatal: couldn't find remote ref".to_string(),
            });
        }
        Ok(())
    }

    async fn local_rev(&self, _path: &Path) -> Result<String> {
        Ok("1111111".to_string())
    }

    async fn upstream_rev(&self, _path: &Path) -> Result<String> {
        Ok("1111111".to_string())
    }

    async fn hard_reset_to_upstream(&self, path: &Path) -> Result<()> {
        self.record(format!("reset:{}", Self::tree(path)));
        Ok(())
    }
}

#[async_trait]
impl ImageProbe for Fake {
    async fn probe_manifest(&self, reference: &str) -> bool {
        self.record(format!("manifest:{}", reference));
        reference == "redis:7"
    }
}

#[async_trait]
impl ImageBuilder for Fake {
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
impl ContainerRuntime for Fake {
    async fn validate(&self, _compose_file: &Path) -> Result<()> {
        if self.0.reject_writes.load(Ordering::SeqCst) {
            return Err(FoundationError::ConfigCorrupted("service \"x\" is invalid".to_string()));
        }
        Ok(())
    }

    async fn up(&self, compose_file: &Path, services: &[String], remove_orphans: bool) -> Result<()> {
        let doc = if compose_file.ends_with("services/compose.json") {
            "services"
        } else {
            "core"
        };
        self.record(format!("up:{}:{}:{}", doc, services.join(","), remove_orphans));
        Ok(())
    }

    async fn pull(&self, _compose_file: &Path, services: &[String]) -> Result<()> {
        self.record(format!("pull:{}", services.join(",")));
        Ok(())
    }

    async fn build(&self, _compose_file: &Path) -> Result<()> {
        self.record("compose-build");
        Ok(())
    }

    async fn ps(&self, _compose_file: &Path) -> Result<BTreeMap<String, ContainerState>> {
        let mut states = BTreeMap::new();
        states.insert(
            "cache".to_string(),
            ContainerState {
                service: "cache".to_string(),
                state: "running".to_string(),
                status: "Up 5 minutes".to_string(),
                created_at: "2024-05-01 10:00:00 +0000 UTC".to_string(),
            },
        );
        Ok(states)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(format!("rm:{}", name));
        Ok(())
    }
}

async fn installed() -> (TempDir, ServiceManager, Fake) {
    let temp = tempdir().unwrap();
    let fake = Fake::default();
    let tools = Toolchain {
        vcs: Box::new(fake.clone()),
        images: Box::new(fake.clone()),
        builder: Box::new(fake.clone()),
        runtime: Box::new(fake.clone()),
    };
    let manager = ServiceManager::new(FoundationConfig::new(temp.path().to_path_buf()), tools);

    manager.install(Some("ops@example.com")).await.unwrap();
    assert_eq!(fake.take_calls(), vec!["up:core::false".to_string()]);

    (temp, manager, fake)
}

fn registry(manager: &ServiceManager) -> Registry {
    RegistryStore::new(manager.config()).load().unwrap()
}

fn request(name: &str, source: &str) -> CreateRequest {
    CreateRequest {
        name: name.to_string(),
        source: source.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_git_service_with_domain() {
    let (_temp, manager, fake) = installed().await;

    let req = CreateRequest {
        domain: Some("api.example.com".to_string()),
        port: Some(3000),
        ..request("api", "https://example.com/repo.git")
    };
    let report = manager.create(&req).await.unwrap();
    assert!(report.is_success());

    let registry = registry(&manager);
    let api = registry.service_config("api").unwrap();
    assert_eq!(api.image.as_deref(), Some("foundation/api"));
    assert_eq!(
        api.environment,
        Some(EnvironmentConfig::Array(vec![
            "VIRTUAL_HOST=api.example.com".to_string(),
            "VIRTUAL_PORT=3000".to_string(),
            "LETSENCRYPT_HOST=api.example.com".to_string(),
        ]))
    );

    assert_eq!(
        fake.take_calls(),
        vec![
            "probe:https://example.com/repo.git".to_string(),
            "clone:https://example.com/repo.git".to_string(),
            "fetch:api".to_string(),
            "build-plan:foundation/api".to_string(),
            "up:core::false".to_string(),
            "up:services:api:false".to_string(),
        ]
    );
    assert!(!manager
        .config()
        .service_path("api")
        .join("api-railpack-plan.json")
        .exists());
}

#[tokio::test]
async fn test_create_persists_gpu_and_restart() {
    let (_temp, manager, _fake) = installed().await;

    let req = CreateRequest {
        restart: RestartPolicy::Always,
        accelerator: true,
        ..request("trainer", "https://example.com/trainer.git")
    };
    manager.create(&req).await.unwrap();

    let raw = std::fs::read_to_string(manager.config().services_compose_path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let trainer = &doc["services"]["trainer"];
    assert_eq!(trainer["restart"], json!("always"));
    assert_eq!(
        trainer["deploy"]["resources"]["reservations"]["devices"],
        json!([{ "driver": "nvidia", "count": "all", "capabilities": ["gpu"] }])
    );

    let def = registry(&manager)
        .definition("trainer", manager.config())
        .unwrap();
    assert_eq!(def.restart, RestartPolicy::Always);
    assert!(def.accelerator);
}

#[tokio::test]
async fn test_create_image_service() {
    let (_temp, manager, fake) = installed().await;

    manager.create(&request("cache", "redis:7")).await.unwrap();

    let registry = registry(&manager);
    assert_eq!(
        registry.service_config("cache").unwrap().image.as_deref(),
        Some("redis:7")
    );
    assert!(!manager.config().service_path("cache").exists());
    assert_eq!(
        fake.take_calls(),
        vec![
            "probe:redis:7".to_string(),
            "manifest:redis:7".to_string(),
            "up:core::false".to_string(),
            "up:services:cache:false".to_string(),
        ]
    );

    let rows = manager.status().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_running());
    assert_eq!(rows[0].domain, None);
}

#[tokio::test]
async fn test_duplicate_create_leaves_registry_unchanged() {
    let (_temp, manager, fake) = installed().await;
    manager.create(&request("cache", "redis:7")).await.unwrap();
    fake.take_calls();

    let before = std::fs::read_to_string(manager.config().services_compose_path()).unwrap();
    let err = manager
        .create(&request("cache", "https://example.com/other.git"))
        .await
        .unwrap_err();

    assert!(matches!(err, FoundationError::DuplicateName(ref name) if name == "cache"));
    let after = std::fs::read_to_string(manager.config().services_compose_path()).unwrap();
    assert_eq!(before, after);
    assert!(fake.take_calls().is_empty());
}

#[tokio::test]
async fn test_invalid_input_fails_before_side_effects() {
    let (_temp, manager, fake) = installed().await;

    let req = CreateRequest {
        volumes: vec!["/srv/data:/data".to_string()],
        ..request("api", "https://example.com/repo.git")
    };
    let err = manager.create(&req).await.unwrap_err();
    assert!(matches!(err, FoundationError::InvalidVolumeName(_)));

    let err = manager
        .create(&request("ghost", "not a thing"))
        .await
        .unwrap_err();
    assert!(matches!(err, FoundationError::ClassificationFailed(_)));

    assert!(registry(&manager).is_empty());
    let calls = fake.take_calls();
    assert!(calls.iter().all(|c| c.starts_with("probe:") || c.starts_with("manifest:")));
}

#[tokio::test]
async fn test_rejected_write_removes_clone() {
    let (_temp, manager, fake) = installed().await;
    fake.0.reject_writes.store(true, Ordering::SeqCst);

    let err = manager
        .create(&request("api", "https://example.com/repo.git"))
        .await
        .unwrap_err();

    assert!(matches!(err, FoundationError::ConfigCorrupted(_)));
    assert!(!manager.config().service_path("api").exists());
    assert!(registry(&manager).is_empty());
}

#[tokio::test]
async fn test_delete_unknown_service() {
    let (_temp, manager, fake) = installed().await;

    let before = std::fs::read_to_string(manager.config().services_compose_path()).unwrap();
    let err = manager.delete("api").await.unwrap_err();

    assert!(matches!(err, FoundationError::UnknownService(_)));
    assert_eq!(err.remediation().as_deref(), Some("foundation status"));
    let after = std::fs::read_to_string(manager.config().services_compose_path()).unwrap();
    assert_eq!(before, after);
    assert!(fake.take_calls().is_empty());
}

#[tokio::test]
async fn test_delete_removes_service_and_tree() {
    let (_temp, manager, fake) = installed().await;
    manager
        .create(&request("web", "https://example.com/web-dockerfile.git"))
        .await
        .unwrap();
    fake.take_calls();

    manager.delete("web").await.unwrap();

    assert!(!registry(&manager).contains("web"));
    assert!(!manager.config().service_path("web").exists());
    assert_eq!(
        fake.take_calls(),
        vec!["rm:web".to_string(), "up:core::false".to_string()]
    );
}

#[tokio::test]
async fn test_broken_service_does_not_block_siblings() {
    let (_temp, manager, fake) = installed().await;
    manager
        .create(&request("a", "https://example.com/a-dockerfile.git"))
        .await
        .unwrap();
    manager
        .create(&request("b", "https://example.com/b.git"))
        .await
        .unwrap();
    fake.take_calls();
    fake.fail_fetch("b");

    let report = manager.deploy(None).await.unwrap();

    let calls = fake.take_calls();
    assert_eq!(
        calls,
        vec![
            "fetch:a".to_string(),
            "build-file:foundation/a".to_string(),
            "fetch:b".to_string(),
            "up:core::false".to_string(),
            "up:services:a:true".to_string(),
        ]
    );
    assert_eq!(calls.iter().filter(|c| c.starts_with("up:core")).count(), 1);
    assert_eq!(report.started, vec!["a".to_string()]);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], FoundationError::SyncFailed { service, .. } if service == "b"));
}

#[tokio::test]
async fn test_reinstall_keeps_services() {
    let (_temp, manager, fake) = installed().await;
    manager.create(&request("cache", "redis:7")).await.unwrap();
    fake.take_calls();

    manager.install(None).await.unwrap();

    assert!(registry(&manager).contains("cache"));
    assert_eq!(
        fake.take_calls(),
        vec!["up:core::false".to_string(), "up:services:cache:true".to_string()]
    );
    assert!(manager.config_yaml().unwrap().contains("ops@example.com"));
}
