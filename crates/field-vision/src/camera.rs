use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::capture::FrameSource;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CameraConfig {
    pub mode: String,   // "libcamera-jpeg" | "v4l2-mjpeg"
    #[serde(default = "default_device")]
    pub device: String, // /dev/video0 (v4l2)
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

// ideal size hint only, the device may settle on something close
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_device() -> String { "/dev/video0".into() }

/// The external tool that grabs one JPEG for `cfg.mode`, writing it to stdout.
fn grab_command(cfg: &CameraConfig) -> Result<Command> {
    let size = (cfg.width.to_string(), cfg.height.to_string());
    let cmd = match cfg.mode.as_str() {
        "libcamera-jpeg" => {
            let mut cmd = Command::new("libcamera-still");
            cmd.args(["-n", "-t", "1", "--width", &size.0, "--height", &size.1, "-o", "-"]);
            cmd
        }
        "v4l2-mjpeg" => {
            let mut cmd = Command::new("ffmpeg");
            cmd.args(["-hide_banner", "-loglevel", "error", "-f", "video4linux2", "-input_format", "mjpeg"])
                .args(["-video_size", &format!("{}x{}", size.0, size.1), "-i", &cfg.device])
                .args(["-vframes", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "-"]);
            cmd
        }
        other => anyhow::bail!("unknown camera.mode: {}", other),
    };
    Ok(cmd)
}

async fn run_capture(mut cmd: Command) -> Result<Vec<u8>> {
    let tool = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.kill_on_drop(true);
    debug!("capture: {}", tool);

    let out = cmd.output().await.with_context(|| format!("spawn {}", tool))?;
    anyhow::ensure!(
        out.status.success(),
        "{} exited with {}: {}",
        tool,
        out.status,
        String::from_utf8_lossy(&out.stderr).trim()
    );
    anyhow::ensure!(!out.stdout.is_empty(), "{} produced no image", tool);
    Ok(out.stdout)
}

/// One JPEG from the configured device.
pub async fn capture_jpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    run_capture(grab_command(cfg)?).await
}

/// A local camera driven through `capture_jpeg`.
pub struct CameraSource {
    cfg: CameraConfig,
    released: bool,
}

impl CameraSource {
    /// Grabs one probe frame. Failing here means the device is not usable at all.
    pub async fn open(cfg: CameraConfig) -> Result<Self> {
        let jpeg = capture_jpeg(&cfg)
            .await
            .with_context(|| format!("camera access failed ({} {})", cfg.mode, cfg.device))?;
        let probe = image::load_from_memory(&jpeg).context("decode probe frame")?;
        info!(
            "camera: {} ready, native {}x{} (requested {}x{})",
            cfg.mode, probe.width(), probe.height(), cfg.width, cfg.height
        );
        Ok(Self { cfg, released: false })
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!("camera: released {}", self.cfg.mode);
        }
    }
}

impl FrameSource for CameraSource {
    fn is_ready(&self) -> bool {
        if self.released {
            return false;
        }
        match self.cfg.mode.as_str() {
            "v4l2-mjpeg" => Path::new(&self.cfg.device).exists(),
            _ => true,
        }
    }

    async fn capture_frame(&mut self) -> Result<DynamicImage> {
        anyhow::ensure!(!self.released, "camera released");
        let jpeg = capture_jpeg(&self.cfg).await?;
        image::load_from_memory(&jpeg).context("decode jpeg")
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
