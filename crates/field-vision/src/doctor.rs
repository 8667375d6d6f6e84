use anyhow::Result;

use crate::{camera::CameraConfig, CaptureConfig};

pub fn check_capture(cfg: &CaptureConfig) -> Result<()> {
    anyhow::ensure!(
        (100..=10_000).contains(&cfg.frame_interval_ms),
        "detection.frame_interval_ms should be 100..10000, got {}",
        cfg.frame_interval_ms
    );
    anyhow::ensure!(
        (1..=100).contains(&cfg.jpeg_quality),
        "detection.jpeg_quality should be 1..100, got {}",
        cfg.jpeg_quality
    );
    Ok(())
}

pub fn check_camera(cfg: &CameraConfig) -> Result<()> {
    match cfg.mode.as_str() {
        "libcamera-jpeg" => {}
        "v4l2-mjpeg" => anyhow::ensure!(!cfg.device.is_empty(), "camera.device missing for v4l2-mjpeg"),
        other => anyhow::bail!("unknown camera.mode: {}", other),
    }
    anyhow::ensure!(cfg.width >= 16 && cfg.height >= 16, "camera resolution too small: {}x{}", cfg.width, cfg.height);
    Ok(())
}
