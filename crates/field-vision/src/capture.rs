use anyhow::Result;
use field_link::{ConnectionManager, DetectionFeed, LinkError};
use image::DynamicImage;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{encode::encode_jpeg, CaptureConfig};

/// Anything that can hand over the current video frame.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    fn is_ready(&self) -> bool;
    async fn capture_frame(&mut self) -> Result<DynamicImage>;
}

/// At most one frame may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureGate {
    #[default]
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    Busy,
    SourceNotReady,
    CaptureFailed,
    LinkDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub sent: u64,
    pub busy: u64,
    pub not_ready: u64,
    pub failed: u64,
    pub link_down: u64,
}

/// Periodic capture feeding the detection link.
///
/// There is no response timeout. If a result never comes back the gate
/// stays in `AwaitingResponse` and every tick is skipped until `reset`.
pub struct FrameCaptureLoop<S: FrameSource> {
    source: Option<S>,
    gate: CaptureGate,
    quality: u8,
    period: Duration,
    timer: Option<Interval>,
    stopped: bool,
    last_frame_size: Option<(u32, u32)>,
    stats: CaptureStats,
}

impl<S: FrameSource> FrameCaptureLoop<S> {
    pub fn new(source: S, cfg: &CaptureConfig) -> Self {
        Self {
            source: Some(source),
            gate: CaptureGate::Idle,
            quality: cfg.jpeg_quality,
            period: Duration::from_millis(cfg.frame_interval_ms.max(1)),
            timer: None,
            stopped: false,
            last_frame_size: None,
            stats: CaptureStats::default(),
        }
    }

    /// Arms the timer. Must run inside a tokio runtime.
    pub fn start(&mut self) {
        if self.stopped || self.timer.is_some() {
            return;
        }
        let mut t = interval(self.period);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(t);
        info!("capture: every {:?}, jpeg quality {}", self.period, self.quality);
    }

    /// Resolves on the next timer tick; never resolves while the timer is not armed.
    pub async fn next_tick(&mut self) {
        match self.timer.as_mut() {
            Some(t) => {
                t.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    pub async fn tick(&mut self, link: &mut ConnectionManager<DetectionFeed>) -> TickOutcome {
        if self.stopped {
            return TickOutcome::Stopped;
        }
        let Some(source) = self.source.as_mut() else {
            return TickOutcome::Stopped;
        };

        if self.gate == CaptureGate::AwaitingResponse {
            self.stats.busy += 1;
            return TickOutcome::Busy;
        }
        if !source.is_ready() {
            self.stats.not_ready += 1;
            return TickOutcome::SourceNotReady;
        }
        if !link.is_connected() {
            self.stats.link_down += 1;
            return TickOutcome::LinkDown;
        }

        let frame = match source.capture_frame().await {
            Ok(f) => f,
            Err(e) => {
                warn!("capture: frame grab failed: {:#}", e);
                self.stats.failed += 1;
                return TickOutcome::CaptureFailed;
            }
        };
        let encoded = match encode_jpeg(&frame, self.quality) {
            Ok(e) => e,
            Err(e) => {
                warn!("capture: {:#}", e);
                self.stats.failed += 1;
                return TickOutcome::CaptureFailed;
            }
        };

        match link.send_frame(&encoded.to_data_uri()) {
            Ok(()) => {
                self.gate = CaptureGate::AwaitingResponse;
                self.last_frame_size = Some((encoded.width, encoded.height));
                self.stats.sent += 1;
                debug!("capture: sent {}x{} frame ({} bytes)", encoded.width, encoded.height, encoded.jpeg.len());
                TickOutcome::Sent
            }
            Err(e @ LinkError::TooLarge(_)) => {
                warn!("capture: {}", e);
                self.stats.failed += 1;
                TickOutcome::CaptureFailed
            }
            Err(e) => {
                debug!("capture: frame dropped: {}", e);
                self.stats.link_down += 1;
                TickOutcome::LinkDown
            }
        }
    }

    pub fn on_detection_result(&mut self) {
        if !self.stopped {
            self.gate = CaptureGate::Idle;
        }
    }

    /// Manual way out of a stalled gate.
    pub fn reset(&mut self) {
        if !self.stopped && self.gate == CaptureGate::AwaitingResponse {
            info!("capture: gate reset while awaiting a response");
            self.gate = CaptureGate::Idle;
        }
    }

    pub fn gate(&self) -> CaptureGate {
        self.gate
    }

    pub fn last_frame_size(&self) -> Option<(u32, u32)> {
        self.last_frame_size
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Disarms the timer. Every later tick is a no-op.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.timer = None;
            debug!("capture: stopped ({:?})", self.stats);
        }
    }

    /// Hands the source back to the caller for release. Stops first.
    pub fn release(&mut self) -> Option<S> {
        self.stop();
        self.source.take()
    }

    /// Stop timer, release device, close transport, in that order.
    pub fn shutdown(&mut self, link: &mut ConnectionManager<DetectionFeed>) {
        self.stop();
        drop(self.release());
        link.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_link::{ConnectionState, SessionHandle, TransportEvent};
    use field_link::transport::RemoteEnd;
    use field_proto::envelope::Envelope;
    use image::RgbImage;
    use std::{cell::Cell, rc::Rc};

    struct FakeCamera {
        ready: Rc<Cell<bool>>,
        fail: bool,
        grabs: Rc<Cell<u32>>,
    }

    impl FrameSource for FakeCamera {
        fn is_ready(&self) -> bool {
            self.ready.get()
        }

        async fn capture_frame(&mut self) -> Result<DynamicImage> {
            self.grabs.set(self.grabs.get() + 1);
            anyhow::ensure!(!self.fail, "device revoked");
            Ok(DynamicImage::ImageRgb8(RgbImage::new(32, 24)))
        }
    }

    struct Rig {
        lp: FrameCaptureLoop<FakeCamera>,
        link: ConnectionManager<DetectionFeed>,
        remote: RemoteEnd,
        ready: Rc<Cell<bool>>,
        grabs: Rc<Cell<u32>>,
    }

    async fn rig(fail: bool) -> Rig {
        let ready = Rc::new(Cell::new(true));
        let grabs = Rc::new(Cell::new(0));
        let cam = FakeCamera { ready: ready.clone(), fail, grabs: grabs.clone() };
        let lp = FrameCaptureLoop::new(cam, &CaptureConfig::default());

        let mut link = ConnectionManager::<DetectionFeed>::new("tcp://127.0.0.1:8080".parse().unwrap());
        let (handle, remote) = SessionHandle::loopback(8);
        link.attach(handle);
        remote.events.send(TransportEvent::Opened).await.unwrap();
        link.next_event().await;
        assert_eq!(link.state(), ConnectionState::Connected);

        Rig { lp, link, remote, ready, grabs }
    }

    fn frames_on_wire(remote: &mut RemoteEnd) -> usize {
        let mut n = 0;
        while let Ok(body) = remote.outbound.try_recv() {
            let env = Envelope::decode(&body).unwrap();
            assert_eq!(env.event, "process_frame");
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn one_frame_in_flight_at_a_time() {
        let mut r = rig(false).await;

        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Sent);
        assert_eq!(r.lp.gate(), CaptureGate::AwaitingResponse);
        assert_eq!(r.lp.last_frame_size(), Some((32, 24)));

        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Busy);
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Busy);
        assert_eq!(frames_on_wire(&mut r.remote), 1);
        assert_eq!(r.grabs.get(), 1);

        r.lp.on_detection_result();
        assert_eq!(r.lp.gate(), CaptureGate::Idle);
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Sent);
        assert_eq!(frames_on_wire(&mut r.remote), 1);

        let st = r.lp.stats();
        assert_eq!((st.sent, st.busy), (2, 2));
    }

    #[tokio::test]
    async fn unready_source_skips_without_engaging_gate() {
        let mut r = rig(false).await;
        r.ready.set(false);
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::SourceNotReady);
        assert_eq!(r.lp.gate(), CaptureGate::Idle);
        assert_eq!(r.grabs.get(), 0);

        r.ready.set(true);
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Sent);
    }

    #[tokio::test]
    async fn failed_grab_is_dropped() {
        let mut r = rig(true).await;
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::CaptureFailed);
        assert_eq!(r.lp.gate(), CaptureGate::Idle);
        assert_eq!(frames_on_wire(&mut r.remote), 0);
    }

    #[tokio::test]
    async fn link_down_drops_the_tick() {
        let mut r = rig(false).await;
        r.remote.events.send(TransportEvent::Closed).await.unwrap();
        r.link.next_event().await;

        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::LinkDown);
        assert_eq!(r.lp.gate(), CaptureGate::Idle);
        assert_eq!(r.grabs.get(), 0);
    }

    #[tokio::test]
    async fn unanswered_frame_stalls_until_reset() {
        let mut r = rig(false).await;
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Sent);
        for _ in 0..10 {
            assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Busy);
        }
        r.lp.reset();
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Sent);
    }

    #[tokio::test]
    async fn shutdown_is_ordered_and_idempotent() {
        let mut r = rig(false).await;
        r.lp.start();
        r.lp.shutdown(&mut r.link);
        r.lp.shutdown(&mut r.link);

        assert_eq!(r.link.state(), ConnectionState::Disconnected);
        assert!(r.lp.release().is_none());
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Stopped);

        // a result arriving after teardown must not reopen the gate
        r.lp.on_detection_result();
        r.lp.reset();
        assert_eq!(r.lp.tick(&mut r.link).await, TickOutcome::Stopped);

        let waited = tokio::time::timeout(Duration::from_millis(30), r.lp.next_tick()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn armed_timer_ticks() {
        let mut r = rig(false).await;
        r.lp.start();
        // first interval tick completes immediately
        tokio::time::timeout(Duration::from_millis(200), r.lp.next_tick()).await.unwrap();
    }
}
