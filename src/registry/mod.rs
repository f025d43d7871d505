//! Service registry
//!
//! The registry is the pair of compose documents Foundation owns: the proxy
//! core and the user services. It is loaded once per command, mutated in
//! memory and persisted once on success.

pub mod storage;

pub use storage::RegistryStore;

use crate::compose::config::{ComposeConfig, ServiceConfig};
use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::service::ServiceDefinition;

/// In-memory registry
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    /// Proxy core document
    pub core: ComposeConfig,
    /// Services document
    pub services: ComposeConfig,
}

impl Registry {
    /// Create a registry from its two documents
    pub fn new(core: ComposeConfig, services: ComposeConfig) -> Self {
        Self { core, services }
    }

    /// Whether a service with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.services.services.contains_key(name)
    }

    /// Service names in stable order
    pub fn service_names(&self) -> Vec<String> {
        self.services.services.keys().cloned().collect()
    }

    /// Whether no services are defined
    pub fn is_empty(&self) -> bool {
        self.services.services.is_empty()
    }

    /// Raw compose entry for a service
    pub fn service_config(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.services.get(name)
    }

    /// Typed definition for a service
    pub fn definition(&self, name: &str, config: &FoundationConfig) -> Result<ServiceDefinition> {
        self.service_config(name)
            .map(|svc| ServiceDefinition::from_service_config(name, svc, config))
            .ok_or_else(|| FoundationError::UnknownService(name.to_string()))
    }

    /// Add a new service, declaring any volumes it introduces
    ///
    /// Returns the volumes that were not declared before. The registry is
    /// untouched when the name is taken.
    pub fn insert(&mut self, definition: &ServiceDefinition) -> Result<Vec<String>> {
        if self.contains(&definition.name) {
            return Err(FoundationError::DuplicateName(definition.name.clone()));
        }

        let mut introduced = Vec::new();
        for volume in &definition.volumes {
            if !self.services.volumes.contains_key(&volume.name) {
                self.services
                    .volumes
                    .insert(volume.name.clone(), Default::default());
                introduced.push(volume.name.clone());
            }
        }

        self.services
            .services
            .insert(definition.name.clone(), definition.to_service_config());

        Ok(introduced)
    }

    /// Remove a service, leaving its volumes declared
    pub fn remove(&mut self, name: &str) -> Result<ServiceConfig> {
        self.services
            .services
            .remove(name)
            .ok_or_else(|| FoundationError::UnknownService(name.to_string()))
    }
}
