extern crate rocket;

use envoy_relay::config::{load_config, Config};
use envoy_relay::routes::mount_relay;
use envoy_relay::session::Monitor;
use envoy_relay::state::AppState;
use envoy_relay::token::TokenStore;
use log::{info, warn};
use rocket::tokio;
use std::sync::Arc;
use std::time::Duration;

/// Keep a headless monitoring session alive, retrying until a token is available.
async fn run_monitor(config: Config, tokens: Arc<TokenStore>) {
    let mut monitor = match Monitor::from_config(&config, tokens) {
        Ok(monitor) => monitor,
        Err(e) => {
            warn!(target: "app", "Monitor disabled: {}", e);
            return;
        }
    };
    let retry = Duration::from_secs(config.monitor.interval_seconds.max(1));

    loop {
        let started = monitor
            .start(|m| {
                info!(target: "app",
                    "Production {:.1} W | Consumption {:.1} W | Net {:+.1} W | Panels {} W ({:.1}%) | Grid {}",
                    m.production,
                    m.consumption,
                    m.net,
                    m.panel_total_watts,
                    m.efficiency_percent,
                    if m.grid_connected { "on" } else { "off" }
                );
            })
            .await;
        match started {
            Ok(_) => break,
            Err(e) => {
                info!(target: "app", "Monitor not started: {}", e);
                tokio::time::sleep(retry).await;
            }
        }
    }

    // the session lives as long as this task
    std::future::pending::<()>().await;
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = load_config(&config_path)?;

    let tokens = Arc::new(TokenStore::new());
    match config.envoy.seed_token() {
        Some(token) => tokens.set_token(token)?,
        None if config.envoy.token.is_some() => {
            warn!(target: "app", "Configured token is blank, waiting for token");
        }
        None => {}
    }
    let app_state = Arc::new(AppState::new(&config.envoy, tokens.clone())?);

    if config.monitor.enabled {
        tokio::spawn(run_monitor(config.clone(), tokens));
    }

    let figment = rocket::Config::figment()
        .merge(("address", config.relay.address.clone()))
        .merge(("port", config.relay.port));

    mount_relay(rocket::custom(figment), app_state)
        .launch()
        .await?;

    Ok(())
}
