//! Source classification
//!
//! A user hands `create` one string. It is either a git remote we clone and
//! build ourselves, or an image reference the runtime pulls. The decision is
//! made once here and carried as a [`SourceRef`] from then on.

use super::git::Vcs;
use crate::error::{FoundationError, Result};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// How a service obtains its image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Built from a cloned working tree
    GitTracked,
    /// Pulled from an image registry
    ImageReference,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::GitTracked => write!(f, "git"),
            SourceKind::ImageReference => write!(f, "image"),
        }
    }
}

/// A classified source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Reachable git remote
    GitRemote(String),
    /// Resolvable image reference
    ImageRef(String),
}

impl SourceRef {
    /// The kind of source
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRef::GitRemote(_) => SourceKind::GitTracked,
            SourceRef::ImageRef(_) => SourceKind::ImageReference,
        }
    }

    /// The original source string
    pub fn as_str(&self) -> &str {
        match self {
            SourceRef::GitRemote(s) | SourceRef::ImageRef(s) => s,
        }
    }
}

/// Image registry boundary
#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// Whether a manifest exists for `reference` in an accessible registry
    async fn probe_manifest(&self, reference: &str) -> bool;
}

/// Classify a source string, git remotes first
///
/// Returns `None` when the source is neither; the caller must not mutate
/// anything in that case.
pub async fn classify(source: &str, vcs: &dyn Vcs, images: &dyn ImageProbe) -> Option<SourceRef> {
    let source = source.trim();
    if source.is_empty() || source.starts_with('-') {
        return None;
    }

    if vcs.probe(source).await {
        debug!("Source {} is a git remote", source);
        return Some(SourceRef::GitRemote(source.to_string()));
    }

    if images.probe_manifest(source).await {
        debug!("Source {} is an image reference", source);
        return Some(SourceRef::ImageRef(source.to_string()));
    }

    None
}

/// Classify a source string, failing with `ClassificationFailed`
pub async fn resolve(source: &str, vcs: &dyn Vcs, images: &dyn ImageProbe) -> Result<SourceRef> {
    classify(source, vcs, images)
        .await
        .ok_or_else(|| FoundationError::ClassificationFailed(source.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct Probes {
        git: bool,
        image: bool,
    }

    #[async_trait]
    impl Vcs for Probes {
        async fn probe(&self, _remote: &str) -> bool {
            self.git
        }
        async fn clone_into(&self, _remote: &str, _path: &Path) -> Result<()> {
            unreachable!()
        }
        async fn fetch(&self, _path: &Path) -> Result<()> {
            unreachable!()
        }
        async fn local_rev(&self, _path: &Path) -> Result<String> {
            unreachable!()
        }
        async fn upstream_rev(&self, _path: &Path) -> Result<String> {
            unreachable!()
        }
        async fn hard_reset_to_upstream(&self, _path: &Path) -> Result<()> {
            unreachable!()
        }
    }

    #[async_trait]
    impl ImageProbe for Probes {
        async fn probe_manifest(&self, _reference: &str) -> bool {
            self.image
        }
    }

    #[tokio::test]
    async fn test_git_wins_ties() {
        let p = Probes { git: true, image: true };
        let source = classify("https://example.com/repo.git", &p, &p).await;
        assert_eq!(
            source,
            Some(SourceRef::GitRemote("https://example.com/repo.git".to_string()))
        );
    }

    #[tokio::test]
    async fn test_image_reference() {
        let p = Probes { git: false, image: true };
        let source = classify("redis:7", &p, &p).await.unwrap();
        assert_eq!(source.kind(), SourceKind::ImageReference);
        assert_eq!(source.as_str(), "redis:7");
    }

    #[tokio::test]
    async fn test_unrecognized() {
        let p = Probes { git: false, image: false };
        let err = resolve("nope", &p, &p).await.unwrap_err();
        assert!(matches!(err, FoundationError::ClassificationFailed(_)));
    }

    #[tokio::test]
    async fn test_option_like_source_is_rejected() {
        let p = Probes { git: true, image: true };
        assert_eq!(classify("--upload-pack=x", &p, &p).await, None);
    }
}
