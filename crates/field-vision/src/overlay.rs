//! Maps detection boxes from source frame pixels into display pixels.
//!
//! Everything here is a pure function of (batch, native size, displayed
//! size). Callers recompute whenever any of the three changes.

use field_proto::detection::{Detection, DetectionBatch};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl From<(u32, u32)> for Size {
    fn from((w, h): (u32, u32)) -> Self {
        Self::new(w as f64, h as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };
}

/// Identity whenever the native size is unknown, zero or not finite.
pub fn scale_factors(native: Option<Size>, displayed: Size) -> ScaleFactors {
    match native {
        Some(n) if n.is_usable() => ScaleFactors {
            x: displayed.width / n.width,
            y: displayed.height / n.height,
        },
        _ => ScaleFactors::IDENTITY,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    pub confidence: f64,
}

impl OverlayBox {
    pub fn caption(&self) -> String {
        format!("{} ({:.0}%)", self.label, self.confidence * 100.0)
    }
}

pub fn project_one(d: &Detection, s: ScaleFactors) -> OverlayBox {
    OverlayBox {
        left: d.left() * s.x,
        top: d.top() * s.y,
        width: (d.right() - d.left()) * s.x,
        height: (d.bottom() - d.top()) * s.y,
        label: d.label.clone(),
        confidence: d.confidence,
    }
}

pub fn project(detections: &[Detection], native: Option<Size>, displayed: Size) -> Vec<OverlayBox> {
    let s = scale_factors(native, displayed);
    detections.iter().map(|d| project_one(d, s)).collect()
}

/// Prefers the frame size the service reports, then the last frame we sent.
/// A reported size with a zero side does not count as reported.
pub fn native_size_for(batch: &DetectionBatch, last_frame: Option<(u32, u32)>) -> Option<Size> {
    batch
        .image_size()
        .map(Size::from)
        .filter(Size::is_usable)
        .or_else(|| last_frame.map(Size::from))
}
