//! Service definition builder
//!
//! Turns the loose arguments of `create` into a [`ServiceDefinition`]. All
//! input checks run in [`ServiceDefinitionBuilder::validate`] before anything
//! touches the disk or the network.

use super::definition::{
    Environment, RestartPolicy, ServiceDefinition, VolumePair, LETSENCRYPT_EMAIL,
    LETSENCRYPT_HOST, VIRTUAL_HOST, VIRTUAL_PORT,
};
use crate::compose::proxy::{ACME_SERVICE, PROXY_SERVICE};
use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::registry::Registry;
use crate::source::{SourceRef, Vcs};
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

/// Port the proxy forwards to when a domain is given without one
pub const DEFAULT_PORT: u16 = 80;

/// Arguments of a `create` request
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Service name
    pub name: String,
    /// Git remote or image reference
    pub source: String,
    /// Domain routed to the service
    pub domain: Option<String>,
    /// Container port behind the domain
    pub port: Option<u16>,
    /// Certificate notification address for this service
    pub tls_email: Option<String>,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    /// `NAME:PATH` pairs
    pub volumes: Vec<String>,
    /// Restart policy
    pub restart: RestartPolicy,
    /// Reserve GPUs
    pub accelerator: bool,
}

/// A request that passed validation, waiting for its source
#[derive(Debug, Clone)]
pub struct ServiceDraft {
    name: String,
    environment: Environment,
    volumes: Vec<VolumePair>,
    restart: RestartPolicy,
    accelerator: bool,
}

/// Names double as container names and image path components, so they follow
/// the stricter image path grammar: lowercase, with separators only between
/// alphanumeric runs.
fn service_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$")
            .expect("service name pattern is valid")
    })
}

/// Builder for service definitions
pub struct ServiceDefinitionBuilder<'a> {
    config: &'a FoundationConfig,
}

impl<'a> ServiceDefinitionBuilder<'a> {
    /// Create a builder
    pub fn new(config: &'a FoundationConfig) -> Self {
        Self { config }
    }

    /// Check a request against the registry without side effects
    pub fn validate(&self, registry: &Registry, request: &CreateRequest) -> Result<ServiceDraft> {
        let name = request.name.trim();

        if registry.contains(name) {
            return Err(FoundationError::DuplicateName(name.to_string()));
        }
        let reserved = name == PROXY_SERVICE
            || name == ACME_SERVICE
            || self.config.service_path(name) == self.config.services_compose_path();
        if !service_name_pattern().is_match(name) || reserved {
            return Err(FoundationError::InvalidServiceName(name.to_string()));
        }

        let mut environment = Environment::new();
        for pair in &request.env {
            let (key, value) = Environment::parse_pair(pair)?;
            environment.set(&key, &value);
        }

        let volumes = request
            .volumes
            .iter()
            .map(|v| VolumePair::parse(v))
            .collect::<Result<Vec<_>>>()?;

        if let Some(domain) = request.domain.as_deref().filter(|d| !d.is_empty()) {
            let port = request.port.unwrap_or(DEFAULT_PORT);
            environment.set(VIRTUAL_HOST, domain);
            environment.set(VIRTUAL_PORT, &port.to_string());
            environment.set(LETSENCRYPT_HOST, domain);
            if let Some(email) = request.tls_email.as_deref().filter(|e| !e.is_empty()) {
                environment.set(LETSENCRYPT_EMAIL, email);
            }
        }

        Ok(ServiceDraft {
            name: name.to_string(),
            environment,
            volumes,
            restart: request.restart,
            accelerator: request.accelerator,
        })
    }

    /// Resolve the image for a validated draft
    ///
    /// Git sources are cloned fresh into the service's working tree; any
    /// earlier tree at that location is removed first. A failed clone leaves
    /// no tree behind.
    pub async fn build(
        &self,
        draft: ServiceDraft,
        source: &SourceRef,
        vcs: &dyn Vcs,
    ) -> Result<ServiceDefinition> {
        let image = match source {
            SourceRef::GitRemote(remote) => {
                self.clone_source(&draft.name, remote, vcs).await?;
                self.config.image_tag(&draft.name)
            }
            SourceRef::ImageRef(reference) => reference.clone(),
        };

        Ok(ServiceDefinition {
            name: draft.name,
            source_kind: source.kind(),
            image,
            environment: draft.environment,
            volumes: draft.volumes,
            network: self.config.network.clone(),
            restart: draft.restart,
            accelerator: draft.accelerator,
        })
    }

    async fn clone_source(&self, name: &str, remote: &str, vcs: &dyn Vcs) -> Result<()> {
        let path = self.config.service_path(name);
        let fetch_failed = |message: String| FoundationError::SourceFetchFailed {
            source_ref: remote.to_string(),
            message,
        };

        if path.exists() {
            info!("Removing stale working tree {}", path.display());
            std::fs::remove_dir_all(&path).map_err(|e| fetch_failed(e.to_string()))?;
        }
        std::fs::create_dir_all(self.config.services_dir())
            .map_err(|e| fetch_failed(e.to_string()))?;

        println!("Cloning source '{}'...", remote);
        if let Err(e) = vcs.clone_into(remote, &path).await {
            if path.exists() {
                let _ = std::fs::remove_dir_all(&path);
            }
            return Err(fetch_failed(e.to_string()));
        }
        println!("Cloned source '{}'.", remote);

        Ok(())
    }
}
