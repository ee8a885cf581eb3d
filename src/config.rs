use crate::envoy::endpoints::Addressing;
use crate::error::ConfigError;
use rocket::serde::de::DeserializeOwned;
use rocket::serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(crate = "rocket::serde", default)]
pub struct Config {
    pub envoy: EnvoyConfig,
    pub relay: RelayConfig,
    pub monitor: MonitorConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde", default)]
pub struct EnvoyConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    /// Seeds the relay's token store at startup
    pub token: Option<String>,
}

impl EnvoyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured token, unless it is missing or blank.
    pub fn seed_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl Default for EnvoyConfig {
    fn default() -> Self {
        EnvoyConfig {
            base_url: "https://envoy.local".to_string(),
            request_timeout_secs: 30,
            accept_invalid_certs: true,
            token: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde", default)]
pub struct RelayConfig {
    pub address: String,
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde", default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub mode: Addressing,
    pub relay_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            enabled: false,
            interval_seconds: 15,
            mode: Addressing::Direct,
            relay_url: "http://localhost:8080".to_string(),
        }
    }
}

pub fn read_config<T: DeserializeOwned>(path: &str) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Load the configuration at `path`, falling back to defaults when the file does not exist.
/// `ENVOY_TOKEN` overrides `envoy.token`.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config: Config = if Path::new(path).exists() {
        read_config(path)?
    } else {
        Config::default()
    };

    if let Ok(token) = std::env::var("ENVOY_TOKEN") {
        config.envoy.token = Some(token);
    }

    Ok(config)
}
