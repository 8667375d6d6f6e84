use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    // [left, top, right, bottom] in source frame pixels
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub label: String,
    pub confidence: f64,
}

impl Detection {
    pub fn left(&self) -> f64 { self.bbox[0] }
    pub fn top(&self) -> f64 { self.bbox[1] }
    pub fn right(&self) -> f64 { self.bbox[2] }
    pub fn bottom(&self) -> f64 { self.bbox[3] }
}

/// Everything the detection service recognized in one processed frame.
/// Some service builds also report the size of the frame they decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl DetectionBatch {
    pub fn image_size(&self) -> Option<(u32, u32)> {
        match (self.image_width, self.image_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}
