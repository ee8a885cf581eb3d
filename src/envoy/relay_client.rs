use log::{info, warn};
use reqwest::Client;
use std::time::Duration;

use crate::envoy::client::DEFAULT_REQUEST_TIMEOUT;
use crate::envoy::endpoints::join_url;
use crate::error::{EnvoyError, EnvoyResult};
use crate::models::{ProxyStatusResponse, TokenRequest};

/// Pushes the caller's token into a relay so relayed telemetry requests are authorized.
pub struct RelayClient {
    relay_url: String,
    client: Client,
}

impl RelayClient {
    pub fn new(relay_url: impl Into<String>) -> EnvoyResult<Self> {
        Self::with_timeout(relay_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(relay_url: impl Into<String>, timeout: Duration) -> EnvoyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnvoyError::Client(e.to_string()))?;
        Ok(RelayClient {
            relay_url: relay_url.into(),
            client,
        })
    }

    pub async fn initialize(&self, token: &str) -> bool {
        let request = TokenRequest {
            token: Some(token.to_string()),
        };
        match self
            .client
            .post(join_url(&self.relay_url, "api/token"))
            .json(&request)
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => {
                info!(target: "app", "Relay at {} initialized with token", self.relay_url);
                true
            }
            Ok(res) => {
                warn!(target: "app", "Relay rejected token (status: {})", res.status());
                false
            }
            Err(e) => {
                warn!(target: "app", "Relay initialization failed: {}", e);
                false
            }
        }
    }

    pub async fn is_available(&self) -> bool {
        self.client
            .get(join_url(&self.relay_url, "api/token/status"))
            .send()
            .await
            .is_ok_and(|res| res.status().is_success())
    }

    pub async fn status(&self) -> String {
        let res = match self
            .client
            .get(join_url(&self.relay_url, "api/token/status"))
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return format!("Error: {}", e),
        };

        if !res.status().is_success() {
            return "Relay not available".to_string();
        }

        match res.json::<ProxyStatusResponse>().await {
            Ok(status) => status.status,
            Err(e) => format!("Error: {}", e),
        }
    }
}
