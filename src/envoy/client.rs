// envoy/client.rs
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rocket::serde::de::DeserializeOwned;
use rocket::serde::json::serde_json;
use rocket::tokio;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::envoy::data_models::{EnergyMetrics, LiveData, Panel, StreamResponse};
use crate::envoy::endpoints::{join_url, Addressing, EndpointMap};
use crate::error::{EnvoyError, EnvoyResult};
use crate::token::{token_preview, TokenStorage};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What caused a metrics cycle. Only recorded in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Timer,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "MANUAL CALL"),
            Trigger::Timer => write!(f, "TIMER CALL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub endpoints: EndpointMap,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl ClientSettings {
    /// Talk to the gateway itself. Gateways ship a self-signed certificate.
    pub fn direct(base_url: impl Into<String>) -> Self {
        ClientSettings {
            base_url: base_url.into(),
            endpoints: EndpointMap::direct(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: true,
        }
    }

    /// Talk to a relay rooted at `relay_url` (its forwarding routes live under `/api/envoy`).
    pub fn relayed(relay_url: &str) -> Self {
        ClientSettings {
            base_url: join_url(relay_url, "api/envoy"),
            endpoints: EndpointMap::relayed(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    pub fn for_mode(mode: Addressing, device_url: &str, relay_url: &str) -> Self {
        match mode {
            Addressing::Direct => ClientSettings::direct(device_url),
            Addressing::Relayed => ClientSettings::relayed(relay_url),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fetches panel and live meter data from a gateway, directly or through the relay,
/// attaching the current bearer token to every request.
pub struct TelemetryClient {
    base_url: String,
    endpoints: EndpointMap,
    tokens: Arc<dyn TokenStorage>,
    client: Client,
    details: Mutex<String>,
}

impl TelemetryClient {
    pub fn new(settings: ClientSettings, tokens: Arc<dyn TokenStorage>) -> EnvoyResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| EnvoyError::Client(e.to_string()))?;

        Ok(TelemetryClient {
            base_url: settings.base_url,
            endpoints: settings.endpoints,
            tokens,
            client,
            details: Mutex::new(String::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Trail of the most recent metrics cycle: endpoints hit, status codes, body sizes, failures.
    pub fn last_error_details(&self) -> String {
        self.details_lock().clone()
    }

    pub fn clear_diagnostics(&self) {
        self.details_lock().clear();
    }

    fn details_lock(&self) -> MutexGuard<'_, String> {
        self.details.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn note(&self, entry: impl AsRef<str>) {
        let mut details = self.details_lock();
        if !details.is_empty() {
            details.push_str(" | ");
        }
        details.push_str(entry.as_ref());
    }

    async fn bearer(&self) -> EnvoyResult<String> {
        match self.tokens.get_token().await {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(EnvoyError::Unauthorized),
        }
    }

    async fn send(&self, request: RequestBuilder, label: &str) -> EnvoyResult<Response> {
        let token = self.bearer().await?;
        let res = match request.bearer_auth(token).send().await {
            Ok(res) => res,
            Err(e) => {
                self.note(format!("{} Exception: {}", label, e));
                return Err(e.into());
            }
        };

        let status = res.status();
        self.note(format!("{} HTTP: {}", label, status));
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        let err = EnvoyError::fetch_failed(status.as_u16(), &body);
        if let EnvoyError::FetchFailed { body, .. } = &err {
            self.note(format!("{} Error: {}", label, body));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EnvoyError::Unauthorized);
        }
        Err(err)
    }

    async fn read_json<T: DeserializeOwned>(&self, res: Response, label: &str) -> EnvoyResult<T> {
        let body = res.text().await.map_err(|e| {
            self.note(format!("{} Exception: {}", label, e));
            EnvoyError::from(e)
        })?;
        self.note(format!("{} JSON: {} chars", label, body.len()));
        serde_json::from_str(&body).map_err(|e| {
            self.note(format!("{} Exception: {}", label, e));
            EnvoyError::Decode(e.to_string())
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, label: &str) -> EnvoyResult<T> {
        let url = join_url(&self.base_url, path);
        debug!(target: "app", "GET {}", url);
        let res = self.send(self.client.get(&url), label).await?;
        self.read_json(res, label).await
    }

    pub async fn fetch_panels(&self) -> EnvoyResult<Vec<Panel>> {
        let panels: Option<Vec<Panel>> = self.get_json(&self.endpoints.panels, "Panels").await?;
        Ok(panels.unwrap_or_default())
    }

    pub async fn fetch_live_data(&self) -> EnvoyResult<LiveData> {
        let live: Option<LiveData> = self.get_json(&self.endpoints.live_data, "Live").await?;
        Ok(live.unwrap_or_default())
    }

    /// Ask the gateway to start streaming live data and return its answer.
    pub async fn request_stream(&self) -> EnvoyResult<StreamResponse> {
        let url = join_url(&self.base_url, &self.endpoints.stream);
        debug!(target: "app", "POST {}", url);
        let request = self.client.post(&url).json(&serde_json::json!({}));
        let res = self.send(request, "Stream").await?;
        let stream: Option<StreamResponse> = self.read_json(res, "Stream").await?;
        Ok(stream.unwrap_or_default())
    }

    pub async fn enable_stream(&self) -> bool {
        match self.request_stream().await {
            Ok(stream) => stream.is_enabled(),
            Err(e) => {
                debug!(target: "app", "Error enabling live data stream: {}", e);
                false
            }
        }
    }

    pub async fn is_stream_enabled(&self) -> bool {
        self.fetch_live_data()
            .await
            .map(|live| live.is_stream_enabled())
            .unwrap_or(false)
    }

    pub async fn test_connection(&self) -> bool {
        let url = join_url(&self.base_url, &self.endpoints.live_data);
        self.send(self.client.get(&url), "Test").await.is_ok()
    }

    /// Fetch panels and live data concurrently and derive one metrics reading.
    pub async fn compute_metrics(&self, trigger: Trigger) -> EnvoyResult<EnergyMetrics> {
        *self.details_lock() = trigger.to_string();

        let token = match self.bearer().await {
            Ok(token) => token,
            Err(e) => {
                self.note("No token available");
                return Err(e);
            }
        };
        self.note(format!(
            "Token [{} chars] ({})",
            token.chars().count(),
            token_preview(&token)
        ));

        self.note("Starting API calls");
        let (panels, live) = tokio::join!(self.fetch_panels(), self.fetch_live_data());

        let (panels, live) = match (panels, live) {
            (Ok(panels), Ok(live)) => (panels, live),
            (Err(e), _) | (_, Err(e)) => {
                self.note(format!("FAILED: {}", e));
                return Err(e);
            }
        };

        self.note(format!(
            "Panels: {}, Live: {}",
            panels.len(),
            if live.meters.is_some() { "OK" } else { "NULL" }
        ));

        let Some(snapshot) = live.snapshot() else {
            self.note("No live data meters");
            return Err(EnvoyError::NoMeterData);
        };

        let metrics = EnergyMetrics::derive(&panels, &snapshot, chrono::Utc::now());
        self.note(format!(
            "SUCCESS P:{:.1}W C:{:.1}W",
            metrics.production, metrics.consumption
        ));
        Ok(metrics)
    }
}
