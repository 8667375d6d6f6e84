use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::{debug, info, warn};

use field_agro::gdd::{self, DEFAULT_BASE_TEMP_C};
use field_agro::health::{connection_indicator, present, HealthView};
use field_link::{doctor as link_doctor, ConnectionEvent, ConnectionManager, ConnectionState, DetectionFeed, TcpConnector, TelemetryFeed};
use field_vision::camera::{CameraConfig, CameraSource};
use field_vision::overlay::{native_size_for, OverlayBox};
use field_vision::{doctor as vision_doctor, project, CaptureConfig, FrameCaptureLoop, Size, TickOutcome};

#[derive(Debug, Parser)]
#[command(name = "fieldwatch", version, about = "FieldWatch - crop health telemetry and leaf disease detection client")]
struct Cli {
    #[arg(long, default_value = "fieldwatch.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the config file without connecting anywhere.
    Doctor,
    /// Follow the live telemetry feed.
    Health,
    /// Stream camera frames to the detection service and print the boxes.
    Detect {
        /// Size of the surface the boxes are drawn on, e.g. 1280x720.
        #[arg(long, default_value = "1280x720")]
        display: DisplaySize,
    },
    /// Growing Degree Days for one day.
    Gdd {
        #[arg(long, allow_hyphen_values = true)]
        max: String,
        #[arg(long, allow_hyphen_values = true)]
        min: String,
        #[arg(long, allow_hyphen_values = true, default_value_t = DEFAULT_BASE_TEMP_C.to_string())]
        base: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct DisplaySize {
    width: f64,
    height: f64,
}

impl FromStr for DisplaySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
        let width: f64 = w.trim().parse().map_err(|_| format!("bad width in {:?}", s))?;
        let height: f64 = h.trim().parse().map_err(|_| format!("bad height in {:?}", s))?;
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(format!("display size must be positive: {:?}", s));
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    telemetry: Option<TelemetryCfg>,
    detection: Option<DetectionCfg>,
    camera: Option<CameraConfig>,
}

#[derive(Debug, serde::Deserialize)]
struct TelemetryCfg {
    endpoint: String,
}

#[derive(Debug, serde::Deserialize)]
struct DetectionCfg {
    endpoint: String,
    #[serde(flatten)]
    capture: CaptureConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Doctor => doctor(&load_config(&cli.config)?)?,
        Command::Health => health(&load_config(&cli.config)?).await?,
        Command::Detect { display } => detect(&load_config(&cli.config)?, display).await?,
        Command::Gdd { max, min, base } => gdd_cmd(&max, &min, &base)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let telemetry = match &cfg.telemetry {
        Some(t) => Some(link_doctor::check_endpoint("telemetry", &t.endpoint)?),
        None => {
            warn!("doctor: no [telemetry] section; `health` will not run");
            None
        }
    };

    if let Some(d) = &cfg.detection {
        let ep = link_doctor::check_endpoint("detection", &d.endpoint)?;
        vision_doctor::check_capture(&d.capture)?;
        if let Some(t) = &telemetry {
            link_doctor::check_distinct(t, &ep)?;
        }
        let cam = cfg.camera.as_ref().context("[detection] configured but [camera] missing")?;
        vision_doctor::check_camera(cam)?;
    } else {
        warn!("doctor: no [detection] section; `detect` will not run");
    }

    info!("doctor: OK");
    Ok(())
}

async fn health(cfg: &Config) -> Result<()> {
    let t = cfg.telemetry.as_ref().context("no [telemetry] config section")?;
    let endpoint = link_doctor::check_endpoint("telemetry", &t.endpoint)?;

    let mut link = ConnectionManager::<TelemetryFeed>::new(endpoint);
    link.activate(&TcpConnector::new());
    print_status(link.state());
    print_health(&present(None));

    loop {
        tokio::select! {
            ev = link.next_event() => match ev {
                Some(ConnectionEvent::Payload(snap)) => print_health(&present(Some(&snap))),
                Some(_) => print_status(link.state()),
                // session is over and there is no retry
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("health: interrupted");
                break;
            }
        }
    }

    link.teardown();
    Ok(())
}

async fn detect(cfg: &Config, display: DisplaySize) -> Result<()> {
    let d = cfg.detection.as_ref().context("no [detection] config section")?;
    let endpoint = link_doctor::check_endpoint("detection", &d.endpoint)?;
    vision_doctor::check_capture(&d.capture)?;
    let cam_cfg = cfg.camera.clone().context("no [camera] config section")?;

    // no camera, no detection feed: report and give up
    let camera = CameraSource::open(cam_cfg)
        .await
        .context("Could not access camera. Check permissions and the device, then rerun")?;

    let mut link = ConnectionManager::<DetectionFeed>::new(endpoint);
    link.activate(&TcpConnector::new());
    print_status(link.state());

    let mut capture = FrameCaptureLoop::new(camera, &d.capture);
    capture.start();
    let displayed = Size::new(display.width, display.height);

    loop {
        tokio::select! {
            _ = capture.next_tick() => {
                let outcome = capture.tick(&mut link).await;
                if outcome != TickOutcome::Sent {
                    debug!("detect: tick skipped ({:?})", outcome);
                }
            }
            ev = link.next_event() => match ev {
                Some(ConnectionEvent::Payload(batch)) => {
                    capture.on_detection_result();
                    let native = native_size_for(&batch, capture.last_frame_size());
                    print_overlay(&project(&batch.detections, native, displayed));
                }
                Some(_) => print_status(link.state()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("detect: interrupted");
                break;
            }
        }
    }

    let stats = capture.stats();
    capture.shutdown(&mut link);
    info!(
        "detect: done (sent={} busy={} not_ready={} failed={} link_down={})",
        stats.sent, stats.busy, stats.not_ready, stats.failed, stats.link_down
    );
    Ok(())
}

fn gdd_cmd(max: &str, min: &str, base: &str) -> Result<()> {
    let g = gdd::calculate(max, min, base).context("Please enter valid numbers")?;
    println!("average={:.2}C", g.average_c);
    println!("GDD={}", g);
    Ok(())
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn print_status(state: ConnectionState) {
    let ind = connection_indicator(state);
    println!("ts={} feed={} ({})", now_ms(), ind.label, state);
}

fn print_health(v: &HealthView) {
    println!("ts={} status={} {}", now_ms(), v.status.icon, v.status.label);
    for s in &v.sensors {
        println!("  {:<14} {}", s.label, s.value);
    }
    println!("  suggestions:");
    for line in v.suggestion_lines() {
        println!("    - {}", line);
    }
}

fn print_overlay(boxes: &[OverlayBox]) {
    println!("ts={} detections={}", now_ms(), boxes.len());
    for b in boxes {
        println!(
            "  {} left={:.1} top={:.1} width={:.1} height={:.1}",
            b.caption(), b.left, b.top, b.width, b.height
        );
    }
}
