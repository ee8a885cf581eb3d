use chrono::Utc;
use std::sync::Arc;

use crate::config::EnvoyConfig;
use crate::envoy::client::{ClientSettings, TelemetryClient};
use crate::error::EnvoyResult;
use crate::models::{ProxyStatusResponse, STATUS_READY, STATUS_WAITING};
use crate::token::{BearerToken, TokenStore};

/// Shared by every relay request: the token store and one client pointed at the real device.
pub struct AppState {
    pub tokens: Arc<TokenStore>,
    pub envoy_client: Arc<TelemetryClient>,
}

impl AppState {
    pub fn new(config: &EnvoyConfig, tokens: Arc<TokenStore>) -> EnvoyResult<Self> {
        let mut settings =
            ClientSettings::direct(config.base_url.clone()).with_timeout(config.request_timeout());
        settings.accept_invalid_certs = config.accept_invalid_certs;

        let envoy_client = Arc::new(TelemetryClient::new(settings, tokens.clone())?);
        Ok(AppState {
            tokens,
            envoy_client,
        })
    }

    pub fn status(&self) -> ProxyStatusResponse {
        let token = self.tokens.snapshot();
        let has_token = token.is_some();
        let token_expires_at = token.as_ref().and_then(BearerToken::expires_at);
        ProxyStatusResponse {
            has_token,
            last_token_update: token.map(|t| t.last_updated),
            status: if has_token { STATUS_READY } else { STATUS_WAITING }.to_string(),
            token_expires_at,
            token_expired: token_expires_at.is_some_and(|exp| exp < Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_status_is_consistent_under_concurrent_clears() {
        let tokens = Arc::new(TokenStore::new());
        let state = Arc::new(AppState::new(&EnvoyConfig::default(), tokens.clone()).unwrap());

        let writer = {
            let tokens = tokens.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    tokens.set_token(format!("token-{}", i)).unwrap();
                    tokens.clear_token();
                }
            })
        };

        for _ in 0..2_000 {
            let status = state.status();
            assert_eq!(status.has_token, status.last_token_update.is_some());
            let expected = if status.has_token { STATUS_READY } else { STATUS_WAITING };
            assert_eq!(status.status, expected);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_status_after_clear() {
        let tokens = Arc::new(TokenStore::new());
        let state = AppState::new(&EnvoyConfig::default(), tokens.clone()).unwrap();

        tokens.set_token("abc").unwrap();
        assert!(state.status().has_token);
        tokens.clear_token();

        let status = state.status();
        assert!(!status.has_token);
        assert_eq!(status.last_token_update, None);
        assert_eq!(status.token_expires_at, None);
        assert!(!status.token_expired);
    }
}
