use anyhow::{Context, Result};
use field_proto::{
    detection::DetectionBatch,
    envelope::{Envelope, DETECTION_RESULTS, HEALTH_UPDATE, PROCESS_FRAME},
    telemetry::TelemetrySnapshot,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// A typed view over one remote feed: which inbound event it listens to and
/// what that event carries.
pub trait Feed {
    const NAME: &'static str;
    const INBOUND_EVENT: &'static str;
    type Payload: DeserializeOwned + Clone;
}

/// Inbound-only sensor/status feed.
pub struct TelemetryFeed;

impl Feed for TelemetryFeed {
    const NAME: &'static str = "telemetry";
    const INBOUND_EVENT: &'static str = HEALTH_UPDATE;
    type Payload = TelemetrySnapshot;
}

/// Frames go out, detection batches come back.
pub struct DetectionFeed;

impl DetectionFeed {
    pub const OUTBOUND_EVENT: &'static str = PROCESS_FRAME;
}

impl Feed for DetectionFeed {
    const NAME: &'static str = "detection";
    const INBOUND_EVENT: &'static str = DETECTION_RESULTS;
    type Payload = DetectionBatch;
}

/// `Ok(None)` for well-formed envelopes addressed to some other event.
pub(crate) fn decode_payload<F: Feed>(raw: &[u8]) -> Result<Option<F::Payload>> {
    let env = Envelope::decode(raw).context("decode envelope")?;
    if env.event != F::INBOUND_EVENT {
        debug!("link[{}]: ignoring event {:?}", F::NAME, env.event);
        return Ok(None);
    }
    let payload = serde_json::from_value(env.data)
        .with_context(|| format!("decode {} payload", F::INBOUND_EVENT))?;
    Ok(Some(payload))
}
