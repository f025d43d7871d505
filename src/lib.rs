//! Foundation - Docker services behind a shared reverse proxy
//!
//! Foundation keeps a registry of services that run behind one nginx-proxy
//! and acme-companion core on a shared network. It provides:
//!
//! - Source classification (git remote or registry image)
//! - Service definitions with proxy routing and TLS environment
//! - An on-disk registry written atomically
//! - Upstream sync for git-tracked services
//! - Dockerfile or railpack plan builds
//! - Deploys that keep one broken service from blocking the rest

pub mod compose;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod manager;
pub mod preflight;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod source;

pub use config::FoundationConfig;
pub use error::{FoundationError, Result};
pub use manager::{ServiceManager, ServiceStatus, Toolchain};
