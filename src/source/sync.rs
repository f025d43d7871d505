//! Source synchronizer
//!
//! Working trees under the services directory are deployment artifacts, not
//! checkouts anyone edits. When upstream moves the tree is hard-reset to it.

use super::git::Vcs;
use crate::error::{FoundationError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Result of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The tree moved to a new upstream revision
    Updated,
    /// The tree already matched upstream
    UpToDate,
}

/// Synchronizer for service working trees
pub struct Synchronizer<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> Synchronizer<'a> {
    /// Create a synchronizer over a version control client
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    /// Bring the tree for `service` at `path` up to its upstream
    pub async fn sync(&self, service: &str, path: &Path) -> Result<SyncOutcome> {
        self.try_sync(path)
            .await
            .map_err(|e| FoundationError::SyncFailed {
                service: service.to_string(),
                message: e.to_string(),
            })
    }

    async fn try_sync(&self, path: &Path) -> Result<SyncOutcome> {
        self.vcs.fetch(path).await?;

        let local = self.vcs.local_rev(path).await?;
        let upstream = self.vcs.upstream_rev(path).await?;

        if local == upstream {
            debug!("{} is at upstream {}", path.display(), local);
            return Ok(SyncOutcome::UpToDate);
        }

        info!(
            "Resetting {} from {} to upstream {}",
            path.display(),
            local,
            upstream
        );
        self.vcs.hard_reset_to_upstream(path).await?;

        Ok(SyncOutcome::Updated)
    }
}
