use anyhow::{Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Scheme};

pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const EVENT_QUEUE: usize = 64;
const OUTBOUND_QUEUE: usize = 4;

/// Raw lifecycle events produced by one transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(Bytes),
    Closed,
    Failed(String),
}

/// The client side of one session: inbound events, outbound frames and the
/// task driving the socket (if any).
pub struct SessionHandle {
    pub(crate) events: mpsc::Receiver<TransportEvent>,
    pub(crate) outbound: mpsc::Sender<Bytes>,
    pub(crate) task: Option<JoinHandle<()>>,
}

/// The far side of a loopback session.
pub struct RemoteEnd {
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<Bytes>,
}

impl SessionHandle {
    /// In-process session with no socket behind it. Whoever holds the
    /// `RemoteEnd` plays the server.
    pub fn loopback(depth: usize) -> (SessionHandle, RemoteEnd) {
        let (ev_tx, ev_rx) = mpsc::channel(depth.max(1));
        let (out_tx, out_rx) = mpsc::channel(depth.max(1));
        (
            SessionHandle { events: ev_rx, outbound: out_tx, task: None },
            RemoteEnd { events: ev_tx, outbound: out_rx },
        )
    }
}

pub trait Connector {
    fn open(&self, endpoint: &Endpoint) -> SessionHandle;
}

/// Length-prefixed JSON over plain TCP or TLS. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct TcpConnector {
    tls: TlsConnector,
}

impl TcpConnector {
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let cfg = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
        Self { tls: TlsConnector::from(Arc::new(cfg)) }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    fn open(&self, endpoint: &Endpoint) -> SessionHandle {
        let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let task = tokio::spawn(run_session(endpoint.clone(), self.tls.clone(), ev_tx, out_rx));
        SessionHandle { events: ev_rx, outbound: out_tx, task: Some(task) }
    }
}

async fn run_session(
    endpoint: Endpoint,
    tls: TlsConnector,
    events: mpsc::Sender<TransportEvent>,
    outbound: mpsc::Receiver<Bytes>,
) {
    let last = match connect_and_pump(&endpoint, &tls, &events, outbound).await {
        Ok(()) => TransportEvent::Closed,
        Err(e) => {
            warn!("link: session {} failed: {:#}", endpoint, e);
            TransportEvent::Failed(format!("{:#}", e))
        }
    };
    // receiver gone means the session was torn down; nothing left to tell
    let _ = events.send(last).await;
}

async fn connect_and_pump(
    endpoint: &Endpoint,
    tls: &TlsConnector,
    events: &mpsc::Sender<TransportEvent>,
    outbound: mpsc::Receiver<Bytes>,
) -> Result<()> {
    let tcp = TcpStream::connect(endpoint.addr())
        .await
        .with_context(|| format!("connect {}", endpoint))?;
    tcp.set_nodelay(true).ok();

    match endpoint.scheme {
        Scheme::Tcp => pump(tcp, events, outbound).await,
        Scheme::Tls => {
            let name = ServerName::try_from(endpoint.host.clone()).context("tls server name")?;
            let stream = tls.connect(name, tcp).await.context("tls handshake")?;
            pump(stream, events, outbound).await
        }
    }
}

async fn pump<S>(
    stream: S,
    events: &mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::Receiver<Bytes>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut rd, mut wr) = tokio::io::split(stream);
    if events.send(TransportEvent::Opened).await.is_err() {
        return Ok(());
    }

    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        while let Some(body) = take_frame(&mut buf, MAX_FRAME_BYTES)? {
            if events.send(TransportEvent::Frame(body)).await.is_err() {
                return Ok(());
            }
        }

        tokio::select! {
            n = rd.read_buf(&mut buf) => {
                if n.context("read frame")? == 0 {
                    anyhow::ensure!(buf.is_empty(), "connection closed mid-frame ({} bytes pending)", buf.len());
                    debug!("link: remote closed");
                    return Ok(());
                }
            }
            msg = outbound.recv() => match msg {
                Some(body) => match encode_frame(&body, MAX_FRAME_BYTES) {
                    Ok(wire) => {
                        wr.write_all(&wire).await.context("write frame")?;
                        wr.flush().await.context("flush frame")?;
                    }
                    Err(e) => warn!("link: outbound frame dropped: {:#}", e),
                },
                None => {
                    wr.shutdown().await.ok();
                    return Ok(());
                }
            },
        }
    }
}

/// u32 big-endian length followed by the body.
pub fn encode_frame(body: &[u8], max: usize) -> Result<Bytes> {
    anyhow::ensure!(body.len() <= max, "frame too large: {} > {} bytes", body.len(), max);
    let len = u32::try_from(body.len()).context("frame length does not fit in u32")?;
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(len);
    out.put_slice(body);
    Ok(out.freeze())
}

/// Pops one complete frame off the front of `buf`, if there is one.
pub fn take_frame(buf: &mut BytesMut, max: usize) -> Result<Option<Bytes>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    anyhow::ensure!(len <= max, "frame too large: {} > {} bytes", len, max);
    if buf.len() < 4 + len {
        buf.reserve(4 + len - buf.len());
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(len).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_reads() {
        let wire = encode_frame(b"{\"event\":\"x\"}", MAX_FRAME_BYTES).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..3]);
        assert_eq!(take_frame(&mut buf, MAX_FRAME_BYTES).unwrap(), None);
        buf.extend_from_slice(&wire[3..7]);
        assert_eq!(take_frame(&mut buf, MAX_FRAME_BYTES).unwrap(), None);
        buf.extend_from_slice(&wire[7..]);
        let body = take_frame(&mut buf, MAX_FRAME_BYTES).unwrap().unwrap();
        assert_eq!(&body[..], b"{\"event\":\"x\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"a", 16).unwrap());
        buf.extend_from_slice(&encode_frame(b"bc", 16).unwrap());
        assert_eq!(&take_frame(&mut buf, 16).unwrap().unwrap()[..], b"a");
        assert_eq!(&take_frame(&mut buf, 16).unwrap().unwrap()[..], b"bc");
        assert_eq!(take_frame(&mut buf, 16).unwrap(), None);
    }

    #[test]
    fn oversized_frame_is_an_error() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(&[0u8; 32], MAX_FRAME_BYTES).unwrap());
        assert!(take_frame(&mut buf, 16).is_err());
    }

    #[test]
    fn oversized_outbound_body_is_refused() {
        assert!(encode_frame(&[0u8; 32], 16).is_err());
        let wire = encode_frame(&[0u8; 16], 16).unwrap();
        assert_eq!(&wire[..4], &16u32.to_be_bytes());
        assert_eq!(wire.len(), 20);
    }
}
