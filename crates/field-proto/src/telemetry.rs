use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthStatus {
    Healthy,
    HighStress,
    /// Any other classifier label, kept verbatim.
    Unknown(String),
}

impl From<String> for HealthStatus {
    fn from(s: String) -> Self {
        if s == "Healthy" {
            HealthStatus::Healthy
        } else if s == "High Stress" {
            HealthStatus::HighStress
        } else {
            HealthStatus::Unknown(s)
        }
    }
}

impl From<HealthStatus> for String {
    fn from(s: HealthStatus) -> Self {
        match s {
            HealthStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl HealthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::HighStress => "High Stress",
            HealthStatus::Unknown(raw) => raw,
        }
    }
}

/// Sensor readings as reported by the field node. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveData {
    #[serde(rename = "Soil_Moisture", default)]
    pub soil_moisture: Option<f64>,   // %
    #[serde(rename = "Soil_Temperature", default)]
    pub soil_temperature: Option<f64>, // °C
    #[serde(rename = "Humidity", default)]
    pub humidity: Option<f64>,        // %
}

/// One `health_update` payload. Superseded wholesale by the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub plant_health_status: Option<HealthStatus>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub live_data: LiveData,
}
