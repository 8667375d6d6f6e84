//! Turns the latest telemetry snapshot into something a person can read.
//!
//! No history and no range checks: whatever the feed says is shown as-is.

use field_proto::{
    state::ConnectionState,
    telemetry::{HealthStatus, TelemetrySnapshot},
};
use serde::Serialize;

pub const PLACEHOLDER: &str = "--";
pub const NO_SUGGESTIONS: &str = "No suggestions at this time. The plant is healthy.";
pub const WAITING_FOR_DATA: &str = "Waiting for data...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusStyle {
    pub label: String,
    pub icon: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthView {
    pub status: StatusStyle,
    pub sensors: Vec<SensorReading>,
    pub suggestions: Vec<String>,
}

impl HealthView {
    /// Suggestions as rendered, with the fallback line when there are none.
    pub fn suggestion_lines(&self) -> Vec<&str> {
        if self.suggestions.is_empty() {
            vec![NO_SUGGESTIONS]
        } else {
            self.suggestions.iter().map(String::as_str).collect()
        }
    }
}

pub fn status_style(status: Option<&HealthStatus>) -> StatusStyle {
    match status {
        Some(HealthStatus::Healthy) => StatusStyle { label: "Healthy".into(), icon: "✅", color: "#2e7d32" },
        Some(HealthStatus::HighStress) => StatusStyle { label: "High Stress".into(), icon: "⚠️", color: "#d32f2f" },
        Some(HealthStatus::Unknown(raw)) => StatusStyle { label: raw.clone(), icon: "...", color: "#5f6368" },
        None => StatusStyle { label: "...".into(), icon: "...", color: "#5f6368" },
    }
}

fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => PLACEHOLDER.to_string(),
    }
}

/// `None` means nothing has been received yet.
pub fn present(snapshot: Option<&TelemetrySnapshot>) -> HealthView {
    let Some(snap) = snapshot else {
        return HealthView {
            status: StatusStyle { label: WAITING_FOR_DATA.into(), icon: "...", color: "#5f6368" },
            sensors: sensors(None),
            suggestions: Vec::new(),
        };
    };

    HealthView {
        status: status_style(snap.plant_health_status.as_ref()),
        sensors: sensors(Some(snap)),
        suggestions: snap.improvement_suggestions.clone(),
    }
}

fn sensors(snap: Option<&TelemetrySnapshot>) -> Vec<SensorReading> {
    let live = snap.map(|s| &s.live_data);
    vec![
        SensorReading { label: "Soil Moisture", value: reading(live.and_then(|l| l.soil_moisture), "%") },
        SensorReading { label: "Temperature", value: reading(live.and_then(|l| l.soil_temperature), "°C") },
        SensorReading { label: "Air Humidity", value: reading(live.and_then(|l| l.humidity), "%") },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub label: &'static str,
    pub color: &'static str,
}

pub fn connection_indicator(state: ConnectionState) -> Indicator {
    match state {
        ConnectionState::Connecting => Indicator { label: "Connecting...", color: "#f44336" },
        ConnectionState::Connected => Indicator { label: "Live Feed Active", color: "#4caf50" },
        ConnectionState::Disconnected => Indicator { label: "Disconnected. Check server/network.", color: "#f44336" },
        ConnectionState::Error => Indicator { label: "Connection Error", color: "#f44336" },
    }
}
