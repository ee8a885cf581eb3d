use rocket::serde::Deserialize;
use std::fmt;

/// How a telemetry client reaches the device. Chosen once when the client is built.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum Addressing {
    /// Straight to the gateway, e.g. `https://envoy.local`
    #[default]
    Direct,
    /// Through the relay's forwarding surface, e.g. `http://localhost:8080/api/envoy`
    Relayed,
}

impl Addressing {
    pub fn endpoints(self) -> EndpointMap {
        match self {
            Addressing::Direct => EndpointMap::direct(),
            Addressing::Relayed => EndpointMap::relayed(),
        }
    }
}

impl fmt::Display for Addressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addressing::Direct => write!(f, "direct"),
            Addressing::Relayed => write!(f, "relayed"),
        }
    }
}

/// Resource paths relative to the client's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMap {
    pub panels: String,
    pub live_data: String,
    pub stream: String,
}

impl EndpointMap {
    pub fn direct() -> Self {
        EndpointMap {
            panels: "api/v1/production/inverters".to_string(),
            live_data: "ivp/livedata/status".to_string(),
            stream: "ivp/livedata/stream".to_string(),
        }
    }

    pub fn relayed() -> Self {
        EndpointMap {
            panels: "panels".to_string(),
            live_data: "livedata".to_string(),
            stream: "stream".to_string(),
        }
    }
}

/// Join a base URL and a relative resource path with exactly one slash.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
