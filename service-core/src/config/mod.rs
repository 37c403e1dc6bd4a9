use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

/// Network settings shared by every service in the workspace. Sourced from an
/// optional `configuration` file overlaid with `SSO__`-prefixed environment
/// variables (e.g. `SSO__PORT=8443`).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("SSO").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        let host: IpAddr = self.host.parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("'{}' is not a bind address", self.host))
        })?;
        Ok(SocketAddr::new(host, self.port))
    }
}
