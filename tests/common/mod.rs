#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use envoy_relay::envoy::client::Trigger;
use envoy_relay::envoy::data_models::EnergyMetrics;
use envoy_relay::error::{EnvoyError, EnvoyResult};
use envoy_relay::polling::MetricsSource;
use rocket::tokio;
use rocket::tokio::sync::Notify;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn metrics(production: f64, consumption: f64, panel_total_watts: i64) -> EnergyMetrics {
    EnergyMetrics {
        production,
        consumption,
        net: production - consumption,
        panel_total_watts,
        efficiency_percent: 50.0,
        timestamp: Utc::now(),
        is_live_data_enabled: true,
        grid_connected: true,
    }
}

/// Scriptable metrics source. While a gate is installed every call blocks until the gate
/// is released.
pub struct FakeSource {
    reading: Mutex<EnergyMetrics>,
    fail: AtomicBool,
    calls: Mutex<Vec<Trigger>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub entered: Notify,
}

impl FakeSource {
    pub fn new(production: f64) -> Arc<Self> {
        Arc::new(FakeSource {
            reading: Mutex::new(metrics(production, 1.0, 300)),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            entered: Notify::new(),
        })
    }

    pub fn set_production(&self, production: f64) {
        let mut reading = self.reading.lock().unwrap();
        reading.production = production;
        reading.net = production - reading.consumption;
    }

    pub fn set_panel_total(&self, watts: i64) {
        self.reading.lock().unwrap().panel_total_watts = watts;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn install_gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn remove_gate(&self) {
        self.gate.lock().unwrap().take();
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn timer_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == Trigger::Timer)
            .count()
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn compute_metrics(&self, trigger: Trigger) -> EnvoyResult<EnergyMetrics> {
        self.calls.lock().unwrap().push(trigger);
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(EnvoyError::FetchFailed {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let mut reading = self.reading.lock().unwrap().clone();
        reading.timestamp = Utc::now();
        Ok(reading)
    }

    fn last_error_details(&self) -> String {
        format!("fake source, {} calls", self.calls())
    }
}

/// Poll `cond` every 10ms for up to five seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Collects every published reading.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<EnergyMetrics>>>,
}

impl Recorder {
    pub fn callback(&self) -> impl Fn(&EnergyMetrics) + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |m: &EnergyMetrics| seen.lock().unwrap().push(m.clone())
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_production(&self) -> Option<f64> {
        self.seen.lock().unwrap().last().map(|m| m.production)
    }
}
