//! Service definitions and the builder that creates them

pub mod builder;
pub mod definition;

pub use builder::{CreateRequest, ServiceDefinitionBuilder, ServiceDraft, DEFAULT_PORT};
pub use definition::{Environment, RestartPolicy, ServiceDefinition, VolumePair};
