//! Compose document reading, writing and structural validation

use super::config::{is_path_like, ComposeConfig};
use crate::error::{FoundationError, Result};
use std::path::Path;

/// Restart values the runtime accepts
pub const RESTART_VALUES: &[&str] = &["no", "always", "on-failure", "unless-stopped"];

/// Compose document parser
pub struct ComposeParser;

impl ComposeParser {
    /// Parse a compose document from path
    pub fn parse_file(path: &Path) -> Result<ComposeConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content).map_err(|e| match e {
            FoundationError::ConfigCorrupted(msg) => {
                FoundationError::ConfigCorrupted(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a compose document from string
    pub fn parse_str(content: &str) -> Result<ComposeConfig> {
        serde_json::from_str(content)
            .map_err(|e| FoundationError::ConfigCorrupted(format!("failed to parse JSON: {}", e)))
    }

    /// Render a compose document the way it is stored on disk
    pub fn to_string(config: &ComposeConfig) -> Result<String> {
        Ok(serde_json::to_string_pretty(config)?)
    }

    /// Validate a compose document, returning non-fatal warnings
    pub fn validate(config: &ComposeConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for (name, service) in &config.services {
            if service.image.is_none() && service.build.is_none() {
                return Err(FoundationError::ConfigCorrupted(format!(
                    "service '{}' must have either 'image' or 'build' specified",
                    name
                )));
            }

            for volume in &service.volumes {
                if volume.split_once(':').is_none() {
                    return Err(FoundationError::ConfigCorrupted(format!(
                        "service '{}' has malformed volume '{}'",
                        name, volume
                    )));
                }
            }

            for volume in service.named_volumes() {
                if !config.volumes.contains_key(&volume) {
                    return Err(FoundationError::ConfigCorrupted(format!(
                        "service '{}' references undeclared volume '{}'",
                        name, volume
                    )));
                }
            }

            for net in service.network_names() {
                if net != "default" && !config.networks.contains_key(&net) {
                    return Err(FoundationError::ConfigCorrupted(format!(
                        "service '{}' references undeclared network '{}'",
                        name, net
                    )));
                }
            }

            if let Some(restart) = &service.restart {
                if !RESTART_VALUES.contains(&restart.as_str()) {
                    warnings.push(format!(
                        "service '{}' has unknown restart policy '{}'",
                        name, restart
                    ));
                }
            }
        }

        for name in config.volumes.keys() {
            if is_path_like(name) {
                warnings.push(format!("volume '{}' looks like a host path", name));
            }
        }

        Ok(warnings)
    }
}
