//! Image management module
//!
//! Probing registries for existing images, and building images for
//! services whose source Foundation tracks.

pub mod builder;
pub mod dispatch;
pub mod registry;

pub use builder::{BuildContext, DockerImageBuilder, ImageBuilder};
pub use dispatch::{BuildAction, BuildDispatcher, BuildOutcome};
pub use registry::DockerManifestProbe;
