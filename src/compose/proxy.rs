//! The proxy core document: reverse proxy plus certificate companion

use super::config::{ComposeConfig, EnvironmentConfig, NetworkConfig, NetworksConfig, ServiceConfig};
use std::collections::BTreeMap;

/// Reverse proxy service name
pub const PROXY_SERVICE: &str = "nginx-proxy";

/// Certificate companion service name
pub const ACME_SERVICE: &str = "nginx-proxy-acme";

const PROXY_IMAGE: &str = "nginxproxy/nginx-proxy";
const ACME_IMAGE: &str = "nginxproxy/acme-companion";
const RESTART: &str = "unless-stopped";

/// Build the proxy core document for the given network
pub fn proxy_core_document(network: &str, default_email: Option<&str>) -> ComposeConfig {
    let networks = || Some(NetworksConfig::Array(vec![network.to_string()]));

    let proxy = ServiceConfig {
        container_name: Some(PROXY_SERVICE.to_string()),
        image: Some(PROXY_IMAGE.to_string()),
        volumes: vec![
            "certs:/etc/nginx/certs".to_string(),
            "html:/usr/share/nginx/html".to_string(),
            "/var/run/docker.sock:/tmp/docker.sock:ro".to_string(),
        ],
        ports: vec!["80:80".to_string(), "443:443".to_string()],
        networks: networks(),
        restart: Some(RESTART.to_string()),
        ..Default::default()
    };

    let acme = ServiceConfig {
        container_name: Some(ACME_SERVICE.to_string()),
        image: Some(ACME_IMAGE.to_string()),
        environment: Some(EnvironmentConfig::Array(vec![format!(
            "DEFAULT_EMAIL={}",
            default_email.unwrap_or_default()
        )])),
        volumes: vec!["acme:/etc/acme.sh".to_string()],
        volumes_from: vec![PROXY_SERVICE.to_string()],
        networks: networks(),
        restart: Some(RESTART.to_string()),
        ..Default::default()
    };

    let mut config = ComposeConfig {
        name: Some(crate::config::APP_NAME.to_string()),
        ..Default::default()
    };
    config.services.insert(PROXY_SERVICE.to_string(), proxy);
    config.services.insert(ACME_SERVICE.to_string(), acme);
    for volume in ["certs", "html", "acme"] {
        config.volumes.insert(volume.to_string(), Default::default());
    }
    config.networks.insert(
        network.to_string(),
        NetworkConfig {
            name: Some(network.to_string()),
            ..Default::default()
        },
    );

    config
}

/// The notification email recorded in a proxy core document
pub fn default_email(core: &ComposeConfig) -> Option<String> {
    let env = core.services.get(ACME_SERVICE)?.environment.as_ref()?;
    let value = match env {
        EnvironmentConfig::Array(items) => items
            .iter()
            .find_map(|item| item.strip_prefix("DEFAULT_EMAIL=").map(str::to_string)),
        EnvironmentConfig::Map(map) => map.get("DEFAULT_EMAIL").cloned().flatten(),
    }?;
    (!value.is_empty()).then_some(value)
}

/// Services document skeleton, keeping existing services and volumes
pub fn services_document(network: &str, existing: Option<ComposeConfig>) -> ComposeConfig {
    let mut config = existing.unwrap_or_default();
    config.name = Some(format!("{} services", crate::config::APP_NAME));

    let mut networks = BTreeMap::new();
    networks.insert(
        network.to_string(),
        NetworkConfig {
            external: Some(true),
            name: Some(network.to_string()),
            ..Default::default()
        },
    );
    config.networks = networks;

    config
}
