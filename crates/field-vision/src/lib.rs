pub mod camera;
pub mod capture;
pub mod doctor;
pub mod encode;
pub mod overlay;

use serde::Deserialize;

pub use capture::{CaptureGate, FrameCaptureLoop, FrameSource, TickOutcome};
pub use overlay::{project, scale_factors, OverlayBox, ScaleFactors, Size};

pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_interval")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { frame_interval_ms: default_interval(), jpeg_quality: default_quality() }
    }
}

fn default_interval() -> u64 { DEFAULT_FRAME_INTERVAL_MS }
fn default_quality() -> u8 { encode::DEFAULT_JPEG_QUALITY }
