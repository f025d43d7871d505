//! Compose documents
//!
//! Foundation never manages containers itself. It writes two compose
//! documents, one for the proxy core and one for user services, and hands
//! them to the container runtime.

pub mod config;
pub mod proxy;
pub mod parser;

pub use config::{ComposeConfig, ServiceConfig};
pub use parser::ComposeParser;
