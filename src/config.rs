//! Foundation settings and on-disk layout

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name, used for the config directory and compose project names
pub const APP_NAME: &str = "foundation";

/// Namespace for images built from tracked sources
pub const DEFAULT_NAMESPACE: &str = "foundation";

/// Network shared by the proxy core and every service
pub const DEFAULT_NETWORK: &str = "foundation_network";

/// Build file that selects a direct image build
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Default timeout for classification probes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable overriding the application directory
pub const HOME_ENV: &str = "FOUNDATION_HOME";

/// Environment variable overriding the probe timeout, in seconds
pub const PROBE_TIMEOUT_ENV: &str = "FOUNDATION_PROBE_TIMEOUT";

/// Process-wide settings, built once and passed by reference
#[derive(Debug, Clone)]
pub struct FoundationConfig {
    /// Application directory
    pub app_dir: PathBuf,
    /// Image namespace for self-built services
    pub namespace: String,
    /// Shared proxy network
    pub network: String,
    /// Timeout applied to source classification probes
    pub probe_timeout: Duration,
    /// Build file name looked up at a source root
    pub build_file: String,
}

impl FoundationConfig {
    /// Create a config rooted at `app_dir` with default settings
    pub fn new(app_dir: PathBuf) -> Self {
        Self {
            app_dir,
            namespace: DEFAULT_NAMESPACE.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            build_file: DOCKERFILE_NAME.to_string(),
        }
    }

    /// Resolve settings from the environment
    pub fn from_env() -> Self {
        let app_dir = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("/etc"))
                    .join(APP_NAME)
            });

        let mut config = Self::new(app_dir);

        if let Some(secs) = std::env::var(PROBE_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.probe_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Proxy core document path
    pub fn core_compose_path(&self) -> PathBuf {
        self.app_dir.join("compose.json")
    }

    /// Directory holding service working trees and the services document
    pub fn services_dir(&self) -> PathBuf {
        self.app_dir.join("services")
    }

    /// Services document path
    pub fn services_compose_path(&self) -> PathBuf {
        self.services_dir().join("compose.json")
    }

    /// Working tree location for a service
    pub fn service_path(&self, name: &str) -> PathBuf {
        self.services_dir().join(name)
    }

    /// Image tag for a self-built service
    pub fn image_tag(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }

    /// Build file location at a source root
    pub fn build_file_at(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.build_file)
    }
}
