use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::envoy::client::{ClientSettings, TelemetryClient};
use crate::envoy::data_models::EnergyMetrics;
use crate::envoy::endpoints::Addressing;
use crate::envoy::relay_client::RelayClient;
use crate::error::{EnvoyError, EnvoyResult};
use crate::polling::{MetricsSource, PollingAggregator, SubscriptionId, DEFAULT_REFRESH_INTERVAL};
use crate::token::TokenStorage;

/// Builds a fresh metrics source for every session.
pub type SourceFactory = Box<dyn Fn() -> EnvoyResult<Arc<dyn MetricsSource>> + Send + Sync>;

fn check_interval(interval: Duration) -> EnvoyResult<Duration> {
    if interval.is_zero() {
        return Err(EnvoyError::InvalidArgument(
            "Refresh interval must be greater than zero".to_string(),
        ));
    }
    Ok(interval)
}

/// One client/aggregator pairing.
struct MonitorSession {
    aggregator: PollingAggregator,
    subscription: Option<SubscriptionId>,
}

impl MonitorSession {
    fn retire(mut self) {
        if let Some(id) = self.subscription.take() {
            self.aggregator.unsubscribe(id);
        }
        self.aggregator.stop_auto_refresh();
        self.aggregator.dispose();
    }
}

/// Owns at most one monitoring session. Starting a new session fully retires the previous
/// one (unsubscribe, stop, dispose) before the replacement's source is even constructed.
pub struct Monitor {
    factory: SourceFactory,
    tokens: Arc<dyn TokenStorage>,
    relay: Option<RelayClient>,
    interval: Duration,
    session: Option<MonitorSession>,
}

impl Monitor {
    pub fn new(factory: SourceFactory, tokens: Arc<dyn TokenStorage>) -> Self {
        Monitor {
            factory,
            tokens,
            relay: None,
            interval: DEFAULT_REFRESH_INTERVAL,
            session: None,
        }
    }

    pub fn from_config(config: &Config, tokens: Arc<dyn TokenStorage>) -> EnvoyResult<Self> {
        let timeout = config.envoy.request_timeout();
        let mut settings = ClientSettings::for_mode(
            config.monitor.mode,
            &config.envoy.base_url,
            &config.monitor.relay_url,
        )
        .with_timeout(timeout);
        if config.monitor.mode == Addressing::Direct {
            settings.accept_invalid_certs = config.envoy.accept_invalid_certs;
        }

        let source_tokens = tokens.clone();
        let factory: SourceFactory = Box::new(move || {
            let client = TelemetryClient::new(settings.clone(), source_tokens.clone())?;
            Ok(Arc::new(client) as Arc<dyn MetricsSource>)
        });

        let mut monitor = Monitor::new(factory, tokens)
            .with_interval(Duration::from_secs(config.monitor.interval_seconds))?;
        if config.monitor.mode == Addressing::Relayed {
            monitor = monitor.with_relay(RelayClient::with_timeout(
                config.monitor.relay_url.clone(),
                timeout,
            )?);
        }
        Ok(monitor)
    }

    pub fn with_relay(mut self, relay: RelayClient) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> EnvoyResult<Self> {
        self.interval = check_interval(interval)?;
        Ok(self)
    }

    /// Replace the current session with a new one and load the first reading.
    ///
    /// The subscriber receives the initial reading and every later update. Auto refresh is
    /// only started when the initial load succeeds; without a token no session is created.
    pub async fn start<F>(&mut self, on_update: F) -> EnvoyResult<EnergyMetrics>
    where
        F: Fn(&EnergyMetrics) + Send + Sync + 'static,
    {
        self.end();

        let Some(token) = self.tokens.get_token().await.filter(|t| !t.trim().is_empty()) else {
            info!(target: "app", "Waiting for token");
            return Err(EnvoyError::Unauthorized);
        };

        if let Some(relay) = &self.relay {
            if !relay.initialize(&token).await {
                warn!(target: "app", "Relay initialization failed | Status: {}", relay.status().await);
            }
        }

        let aggregator = PollingAggregator::new((self.factory)()?);
        let subscription = aggregator.subscribe(on_update)?;
        let initial = aggregator.manual_refresh().await;
        if initial.is_ok() {
            aggregator.start_auto_refresh_every(self.interval)?;
        }

        self.session = Some(MonitorSession {
            aggregator,
            subscription: Some(subscription),
        });
        initial
    }

    pub async fn refresh(&self) -> EnvoyResult<EnergyMetrics> {
        match &self.session {
            Some(session) => session.aggregator.manual_refresh().await,
            None => Err(EnvoyError::Disposed),
        }
    }

    pub fn set_refresh_interval(&mut self, interval_seconds: u64) -> EnvoyResult<()> {
        self.interval = check_interval(Duration::from_secs(interval_seconds))?;
        match &self.session {
            Some(session) => session.aggregator.set_refresh_interval(interval_seconds),
            None => Ok(()),
        }
    }

    pub fn aggregator(&self) -> Option<&PollingAggregator> {
        self.session.as_ref().map(|s| &s.aggregator)
    }

    /// Retire the current session, if any.
    pub fn end(&mut self) {
        if let Some(session) = self.session.take() {
            session.retire();
            info!(target: "app", "Monitoring session ended");
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.end();
    }
}
