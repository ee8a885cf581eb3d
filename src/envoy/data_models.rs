// envoy/data_models.rs
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};

/// One microinverter entry from the production inventory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct Panel {
    pub serial_number: String,
    pub last_report_date: i64, // epoch seconds
    #[serde(rename = "devType")]
    pub device_type: i32,
    pub last_report_watts: i32,
    pub max_report_watts: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct LiveData {
    pub meters: Option<MetersData>,
    pub connection: Option<ConnectionData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct MetersData {
    pub load: Option<PowerData>,
    pub pv: Option<PowerData>,
    pub last_update: Option<i64>,
    /// 0 = open (off-grid), anything else = closed (on-grid)
    #[serde(default)]
    pub main_relay_state: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct PowerData {
    pub agg_p_mw: i64, // milliwatts
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct ConnectionData {
    pub sc_stream: Option<String>,
}

/// Reply to a stream-enable request. The device answers with `sc_stream`, the relay
/// re-exposes it as `streamState`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct StreamResponse {
    #[serde(rename = "streamState", alias = "sc_stream")]
    pub stream_state: Option<String>,
}

impl StreamResponse {
    pub fn is_enabled(&self) -> bool {
        self.stream_state.as_deref() == Some(STREAM_ENABLED)
    }
}

pub const STREAM_ENABLED: &str = "enabled";

/// Flattened view of the meter part of a live data response.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMeterSnapshot {
    pub pv_milliwatts: Option<i64>,
    pub load_milliwatts: Option<i64>,
    pub last_update: Option<i64>,
    pub main_relay_state: i64,
    pub stream_state: Option<String>,
}

impl LiveData {
    /// `None` when the response carried no meters.
    pub fn snapshot(&self) -> Option<LiveMeterSnapshot> {
        let meters = self.meters.as_ref()?;
        Some(LiveMeterSnapshot {
            pv_milliwatts: meters.pv.map(|p| p.agg_p_mw),
            load_milliwatts: meters.load.map(|p| p.agg_p_mw),
            last_update: meters.last_update,
            main_relay_state: meters.main_relay_state,
            stream_state: self.connection.as_ref().and_then(|c| c.sc_stream.clone()),
        })
    }

    pub fn is_stream_enabled(&self) -> bool {
        self.connection
            .as_ref()
            .and_then(|c| c.sc_stream.as_deref())
            == Some(STREAM_ENABLED)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct EnergyMetrics {
    pub production: f64,  // W
    pub consumption: f64, // W
    pub net: f64,         // W
    pub panel_total_watts: i64,
    pub efficiency_percent: f64,
    pub timestamp: DateTime<Utc>,
    pub is_live_data_enabled: bool,
    pub grid_connected: bool,
}

impl EnergyMetrics {
    pub fn derive(panels: &[Panel], live: &LiveMeterSnapshot, timestamp: DateTime<Utc>) -> Self {
        let production = live.pv_milliwatts.unwrap_or(0) as f64 / 1000.0;
        let consumption = live.load_milliwatts.unwrap_or(0) as f64 / 1000.0;

        let panel_total_watts: i64 = panels.iter().map(|p| p.last_report_watts as i64).sum();
        let max_total_watts: i64 = if panels.is_empty() {
            1
        } else {
            panels.iter().map(|p| p.max_report_watts as i64).sum()
        };
        let efficiency_percent = if max_total_watts > 0 {
            panel_total_watts as f64 * 100.0 / max_total_watts as f64
        } else {
            0.0
        };

        EnergyMetrics {
            production,
            consumption,
            net: production - consumption,
            panel_total_watts,
            efficiency_percent,
            timestamp,
            is_live_data_enabled: live.stream_state.as_deref() == Some(STREAM_ENABLED),
            grid_connected: live.main_relay_state != 0,
        }
    }

    /// Whether this reading differs enough from the last published one to notify
    /// observers of a timer-driven update.
    pub fn differs_from(&self, last: &PublishedReading) -> bool {
        (self.production - last.production).abs() > CHANGE_THRESHOLD_WATTS
            || (self.consumption - last.consumption).abs() > CHANGE_THRESHOLD_WATTS
            || self.panel_total_watts != last.panel_total_watts
    }
}

pub const CHANGE_THRESHOLD_WATTS: f64 = 0.01;

/// The triple change-detection compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedReading {
    pub production: f64,
    pub consumption: f64,
    pub panel_total_watts: i64,
}

impl From<&EnergyMetrics> for PublishedReading {
    fn from(m: &EnergyMetrics) -> Self {
        PublishedReading {
            production: m.production,
            consumption: m.consumption,
            panel_total_watts: m.panel_total_watts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::serde::json::serde_json;

    fn panel(last: i32, max: i32) -> Panel {
        Panel {
            serial_number: "482312345678".to_string(),
            last_report_date: 1_700_000_000,
            device_type: 1,
            last_report_watts: last,
            max_report_watts: max,
        }
    }

    fn snapshot(pv: Option<i64>, load: Option<i64>) -> LiveMeterSnapshot {
        LiveMeterSnapshot {
            pv_milliwatts: pv,
            load_milliwatts: load,
            last_update: Some(1_700_000_000),
            main_relay_state: 1,
            stream_state: Some("enabled".to_string()),
        }
    }

    #[test]
    fn test_derive_reference_values() {
        let panels = vec![panel(200, 250), panel(150, 250)];
        let m = EnergyMetrics::derive(&panels, &snapshot(Some(3500), Some(1200)), Utc::now());

        assert!((m.production - 3.5).abs() < 1e-9);
        assert!((m.consumption - 1.2).abs() < 1e-9);
        assert!((m.net - 2.3).abs() < 1e-9);
        assert_eq!(m.panel_total_watts, 350);
        assert!((m.efficiency_percent - 70.0).abs() < 1e-9);
        assert!(m.grid_connected);
        assert!(m.is_live_data_enabled);
    }

    #[test]
    fn test_derive_without_panels() {
        let mut live = snapshot(None, Some(500));
        live.main_relay_state = 0;
        live.stream_state = Some("disabled".to_string());
        let m = EnergyMetrics::derive(&[], &live, Utc::now());

        assert_eq!(m.production, 0.0);
        assert_eq!(m.consumption, 0.5);
        assert_eq!(m.net, -0.5);
        assert_eq!(m.panel_total_watts, 0);
        assert_eq!(m.efficiency_percent, 0.0);
        assert!(!m.grid_connected);
        assert!(!m.is_live_data_enabled);
    }

    #[test]
    fn test_derive_zero_capacity_panels() {
        let m = EnergyMetrics::derive(&[panel(0, 0)], &snapshot(Some(0), Some(0)), Utc::now());
        assert_eq!(m.efficiency_percent, 0.0);
    }

    #[test]
    fn test_change_detection_threshold() {
        let base = EnergyMetrics::derive(&[panel(200, 250)], &snapshot(Some(3500), Some(1200)), Utc::now());
        let last = PublishedReading::from(&base);

        let mut small = base.clone();
        small.production += 0.005;
        assert!(!small.differs_from(&last));

        let mut large = base.clone();
        large.production += 0.02;
        assert!(large.differs_from(&last));

        let mut consumption = base.clone();
        consumption.consumption -= 0.02;
        assert!(consumption.differs_from(&last));

        let mut panels = base.clone();
        panels.panel_total_watts += 1;
        assert!(panels.differs_from(&last));
    }

    #[test]
    fn test_parse_device_live_data() {
        let json = r#"{
            "connection": {"mqtt_state": "connected", "sc_stream": "enabled"},
            "meters": {
                "last_update": 1700000123,
                "main_relay_state": 1,
                "pv": {"agg_p_mw": 3500123, "agg_s_mva": 3600000},
                "load": {"agg_p_mw": 1200456},
                "grid": {"agg_p_mw": -2299667}
            }
        }"#;
        let live: LiveData = serde_json::from_str(json).unwrap();
        let snap = live.snapshot().unwrap();
        assert_eq!(snap.pv_milliwatts, Some(3500123));
        assert_eq!(snap.load_milliwatts, Some(1200456));
        assert_eq!(snap.last_update, Some(1700000123));
        assert_eq!(snap.main_relay_state, 1);
        assert!(live.is_stream_enabled());
    }

    #[test]
    fn test_live_data_without_meters() {
        let live: LiveData = serde_json::from_str(r#"{"connection": {"sc_stream": "disabled"}}"#).unwrap();
        assert!(live.snapshot().is_none());
        assert!(!live.is_stream_enabled());
    }

    #[test]
    fn test_parse_inverters() {
        let json = r#"[
            {"serialNumber": "121", "lastReportDate": 1700000000, "devType": 1, "lastReportWatts": 200, "maxReportWatts": 250},
            {"serialNumber": "122", "lastReportDate": 1700000005, "devType": 1, "lastReportWatts": 150, "maxReportWatts": 250}
        ]"#;
        let panels: Vec<Panel> = serde_json::from_str(json).unwrap();
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].serial_number, "121");
        assert_eq!(panels[1].last_report_watts, 150);
    }

    #[test]
    fn test_stream_response_accepts_both_names() {
        let device: StreamResponse = serde_json::from_str(r#"{"sc_stream": "enabled"}"#).unwrap();
        assert!(device.is_enabled());
        let relay: StreamResponse = serde_json::from_str(r#"{"streamState": "disabled"}"#).unwrap();
        assert!(!relay.is_enabled());
        assert_eq!(
            serde_json::to_value(&device).unwrap(),
            serde_json::json!({"streamState": "enabled"})
        );
    }
}
