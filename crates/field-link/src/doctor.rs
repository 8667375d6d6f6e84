use anyhow::{Context, Result};
use tracing::warn;

use crate::endpoint::{Endpoint, Scheme};

pub fn check_endpoint(name: &str, endpoint: &str) -> Result<Endpoint> {
    let ep: Endpoint = endpoint.parse().with_context(|| format!("{}.endpoint", name))?;
    if ep.scheme == Scheme::Tcp {
        warn!("{}.endpoint uses plain tcp ({}); traffic is not encrypted", name, ep);
    }
    Ok(ep)
}

pub fn check_distinct(telemetry: &Endpoint, detection: &Endpoint) -> Result<()> {
    anyhow::ensure!(
        telemetry != detection,
        "telemetry and detection feeds point at the same endpoint ({}); each feed needs its own session",
        telemetry
    );
    Ok(())
}
