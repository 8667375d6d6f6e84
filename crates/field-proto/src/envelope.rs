use serde::{Deserialize, Serialize};

pub const HEALTH_UPDATE: &str = "health_update";
pub const DETECTION_RESULTS: &str = "detection_results";
pub const PROCESS_FRAME: &str = "process_frame";

/// One framed message on either feed: a named event and its JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(event: &str, data: &T) -> serde_json::Result<Self> {
        Ok(Self { event: event.to_string(), data: serde_json::to_value(data)? })
    }

    pub fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
