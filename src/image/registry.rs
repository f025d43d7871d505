//! Image registry lookups

use crate::runtime::ProcessConfig;
use crate::source::ImageProbe;
use async_trait::async_trait;
use std::time::Duration;

/// Manifest probe via `docker manifest inspect`
#[derive(Debug, Clone)]
pub struct DockerManifestProbe {
    timeout: Duration,
}

impl DockerManifestProbe {
    /// Create a probe that gives up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ImageProbe for DockerManifestProbe {
    async fn probe_manifest(&self, reference: &str) -> bool {
        ProcessConfig::new("docker")
            .args(["manifest", "inspect", reference])
            .timeout(self.timeout)
            .succeeds()
            .await
    }
}
