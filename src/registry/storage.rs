//! Registry storage backend
//!
//! Documents are written to a temporary file next to their destination,
//! checked by the runtime, and only then renamed over the old file. A
//! document the runtime rejects never replaces a good one.

use super::Registry;
use crate::compose::config::ComposeConfig;
use crate::compose::proxy::{default_email, proxy_core_document, services_document};
use crate::compose::ComposeParser;
use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::runtime::ContainerRuntime;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// On-disk registry
pub struct RegistryStore<'a> {
    config: &'a FoundationConfig,
}

impl<'a> RegistryStore<'a> {
    /// Create a store for the configured paths
    pub fn new(config: &'a FoundationConfig) -> Self {
        Self { config }
    }

    /// Whether both documents exist
    pub fn is_initialized(&self) -> bool {
        self.config.core_compose_path().is_file() && self.config.services_compose_path().is_file()
    }

    /// Load and validate both documents
    pub fn load(&self) -> Result<Registry> {
        if !self.is_initialized() {
            return Err(FoundationError::NotInitialized);
        }

        let core = Self::read_document(&self.config.core_compose_path())?;
        let services = Self::read_document(&self.config.services_compose_path())?;

        Ok(Registry::new(core, services))
    }

    /// Persist the services document
    ///
    /// The proxy core document is only written by [`RegistryStore::initialize`].
    pub async fn persist(&self, registry: &Registry, runtime: &dyn ContainerRuntime) -> Result<()> {
        self.write_document(
            &self.config.services_compose_path(),
            &registry.services,
            runtime,
        )
        .await
    }

    /// Write the proxy core and services documents
    ///
    /// Existing services and volumes are kept. Without `email` the address
    /// already recorded in the core document is reused. Both documents are
    /// validated before either replaces its file.
    pub async fn initialize(
        &self,
        email: Option<&str>,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Registry> {
        let core_path = self.config.core_compose_path();
        let services_path = self.config.services_compose_path();

        let existing_email = self
            .read_existing(&core_path)
            .as_ref()
            .and_then(default_email);
        let email = email.map(str::to_string).or(existing_email);
        if email.is_none() {
            warn!("No default email set; certificates will be requested without one");
        }

        let core = proxy_core_document(&self.config.network, email.as_deref());
        let services = services_document(&self.config.network, self.read_existing(&services_path));

        std::fs::create_dir_all(self.config.services_dir())?;
        let staged_core = Self::stage(&core_path, &core, runtime).await?;
        let staged_services = Self::stage(&services_path, &services, runtime).await?;
        Self::commit(staged_core, &core_path)?;
        Self::commit(staged_services, &services_path)?;

        info!("Initialized registry at {}", self.config.app_dir.display());
        Ok(Registry::new(core, services))
    }

    fn read_document(path: &Path) -> Result<ComposeConfig> {
        let doc = ComposeParser::parse_file(path)?;
        for warning in ComposeParser::validate(&doc)? {
            warn!("{}: {}", path.display(), warning);
        }
        Ok(doc)
    }

    /// Read a document during setup; corrupt documents are moved aside
    fn read_existing(&self, path: &Path) -> Option<ComposeConfig> {
        if !path.is_file() {
            return None;
        }

        match Self::read_document(path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                let backup = path.with_extension("json.bak");
                warn!(
                    "Discarding unreadable {} ({}); saved as {}",
                    path.display(),
                    e,
                    backup.display()
                );
                if let Err(e) = std::fs::rename(path, &backup) {
                    warn!("Failed to back up {}: {}", path.display(), e);
                }
                None
            }
        }
    }

    async fn write_document(
        &self,
        path: &Path,
        doc: &ComposeConfig,
        runtime: &dyn ContainerRuntime,
    ) -> Result<()> {
        let staged = Self::stage(path, doc, runtime).await?;
        Self::commit(staged, path)
    }

    /// Write a document to a temporary file next to `path` and have the
    /// runtime check it. The file is dropped if anything fails.
    async fn stage(
        path: &Path,
        doc: &ComposeConfig,
        runtime: &dyn ContainerRuntime,
    ) -> Result<NamedTempFile> {
        ComposeParser::validate(doc)?;
        let content = ComposeParser::to_string(doc)?;

        let dir = path
            .parent()
            .ok_or_else(|| FoundationError::ConfigCorrupted(format!("{} has no parent", path.display())))?;
        std::fs::create_dir_all(dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".compose-")
            .suffix(".json")
            .tempfile_in(dir)?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;

        runtime.validate(staged.path()).await?;
        Ok(staged)
    }

    fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
        staged.persist(path).map_err(|e| FoundationError::Io(e.error))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}
