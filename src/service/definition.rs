//! Service definitions

use crate::compose::config::{
    DeployConfig, DeviceCount, DeviceSpec, EnvironmentConfig, NetworksConfig, ReservationSpec,
    ResourcesConfig, ServiceConfig,
};
use crate::config::FoundationConfig;
use crate::error::{FoundationError, Result};
use crate::source::SourceKind;
use std::fmt;
use std::str::FromStr;

/// Host the proxy routes to this service
pub const VIRTUAL_HOST: &str = "VIRTUAL_HOST";
/// Container port the proxy forwards to
pub const VIRTUAL_PORT: &str = "VIRTUAL_PORT";
/// Host the certificate companion requests a certificate for
pub const LETSENCRYPT_HOST: &str = "LETSENCRYPT_HOST";
/// Per-service certificate notification address
pub const LETSENCRYPT_EMAIL: &str = "LETSENCRYPT_EMAIL";

/// Container restart policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart
    No,
    /// Always restart
    Always,
    /// Restart on non-zero exit
    OnFailure,
    /// Restart unless explicitly stopped
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    /// Value as written in a compose document
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no" | "never" => Ok(RestartPolicy::No),
            "always" => Ok(RestartPolicy::Always),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            other => Err(format!(
                "unknown restart policy '{}' (expected no, always, on-failure or unless-stopped)",
                other
            )),
        }
    }
}

/// Environment variables in insertion order
///
/// Setting a key that is already present moves it to the end with the new
/// value, so the last writer wins and keys written later sort after
/// earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    entries: Vec<(String, String)>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value.to_string()));
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether there are no variables
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a `KEY=VALUE` argument
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(FoundationError::InvalidEnvPair(pair.to_string())),
        }
    }

    /// `KEY=VALUE` strings in order
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Read an environment block from a compose document
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        let mut env = Self::new();
        match config {
            EnvironmentConfig::Array(items) => {
                for item in items {
                    match item.split_once('=') {
                        Some((k, v)) => env.set(k, v),
                        None => env.set(item, ""),
                    }
                }
            }
            EnvironmentConfig::Map(map) => {
                for (k, v) in map {
                    env.set(k, v.as_deref().unwrap_or_default());
                }
            }
        }
        env
    }
}

/// A named volume mounted into a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePair {
    /// Named volume
    pub name: String,
    /// Mount point inside the container
    pub container_path: String,
}

impl VolumePair {
    /// Parse a `NAME:PATH` argument, rejecting bind mounts
    pub fn parse(pair: &str) -> Result<Self> {
        let (name, path) = pair
            .split_once(':')
            .ok_or_else(|| FoundationError::InvalidVolumePair(pair.to_string()))?;

        if crate::compose::config::is_path_like(name) {
            return Err(FoundationError::InvalidVolumeName(name.to_string()));
        }
        if name.is_empty() || path.is_empty() {
            return Err(FoundationError::InvalidVolumePair(pair.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            container_path: path.to_string(),
        })
    }
}

impl fmt::Display for VolumePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.container_path)
    }
}

/// One entry in the services registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Unique service name, also the container name
    pub name: String,
    /// How the image is obtained
    pub source_kind: SourceKind,
    /// Image tag to run
    pub image: String,
    /// Environment variables
    pub environment: Environment,
    /// Named volume mounts
    pub volumes: Vec<VolumePair>,
    /// Shared proxy network
    pub network: String,
    /// Restart policy
    pub restart: RestartPolicy,
    /// Reserve all GPUs for this service
    pub accelerator: bool,
}

impl ServiceDefinition {
    /// Domain routed to this service, if any
    pub fn domain(&self) -> Option<&str> {
        self.environment.get(VIRTUAL_HOST)
    }

    /// Render as a compose service entry
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            container_name: Some(self.name.clone()),
            image: Some(self.image.clone()),
            environment: Some(EnvironmentConfig::Array(self.environment.to_strings())),
            volumes: self.volumes.iter().map(ToString::to_string).collect(),
            networks: Some(NetworksConfig::Array(vec![self.network.clone()])),
            restart: Some(self.restart.as_str().to_string()),
            deploy: self.accelerator.then(accelerator_reservation),
            ..Default::default()
        }
    }

    /// Read a compose service entry back
    ///
    /// The source kind is recovered from the image: only git-tracked
    /// services carry the self-built tag.
    pub fn from_service_config(name: &str, service: &ServiceConfig, config: &FoundationConfig) -> Self {
        let image = service.image.clone().unwrap_or_default();
        let source_kind = if image == config.image_tag(name) {
            SourceKind::GitTracked
        } else {
            SourceKind::ImageReference
        };

        let volumes = service
            .volumes
            .iter()
            .filter_map(|v| v.split_once(':'))
            .map(|(n, p)| VolumePair {
                name: n.to_string(),
                container_path: p.to_string(),
            })
            .collect();

        let accelerator = service
            .deploy
            .as_ref()
            .and_then(|d| d.resources.as_ref())
            .and_then(|r| r.reservations.as_ref())
            .map(|r| r.devices.iter().any(|d| d.capabilities.iter().any(|c| c == "gpu")))
            .unwrap_or(false);

        Self {
            name: name.to_string(),
            source_kind,
            image,
            environment: service
                .environment
                .as_ref()
                .map(Environment::from_config)
                .unwrap_or_default(),
            volumes,
            network: service
                .network_names()
                .into_iter()
                .next()
                .unwrap_or_else(|| config.network.clone()),
            restart: service
                .restart
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or_default(),
            accelerator,
        }
    }
}

/// GPU reservation block: every device of the nvidia driver class
pub fn accelerator_reservation() -> DeployConfig {
    DeployConfig {
        resources: Some(ResourcesConfig {
            limits: None,
            reservations: Some(ReservationSpec {
                devices: vec![DeviceSpec {
                    driver: Some("nvidia".to_string()),
                    count: Some(DeviceCount::Keyword("all".to_string())),
                    capabilities: vec!["gpu".to_string()],
                }],
                ..Default::default()
            }),
        }),
        ..Default::default()
    }
}
