//! Deployment of the proxy core and registry services

pub mod reconciler;

pub use reconciler::{DeployReport, Reconciler, Scope, ServiceReport};
