use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use lapscope_ingest_core::{
    channel, CancellationToken, FrameRx, FrameTx, IngestError, SessionStats, TelemetrySource,
    DEFAULT_CHANNEL_CAPACITY,
};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info, trace, warn};

use crate::layout::{decode_datagram, LayoutKind};

/// Port the console broadcasts telemetry to.
pub const RECV_PORT: u16 = 33740;
/// Port the console listens on for heartbeats.
pub const SEND_PORT: u16 = 33739;
pub const HEARTBEAT: &[u8] = b"A";

const RECV_BUFFER_LEN: usize = 4096;
/// Pause after a socket error so a persistent failure doesn't spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Gt7Config {
    /// Local bind address for receiving packets from the console
    pub bind_addr: String,
    /// Console host name or IP; heartbeats go to `console_host:send_port`
    pub console_host: String,
    pub send_port: u16,
    /// Silence after which the heartbeat is re-sent
    pub idle_timeout_ms: u64,
    /// Proactive heartbeat cadence, in received datagrams
    pub heartbeat_every: u32,
    pub layout: LayoutKind,
    pub channel_capacity: usize,
}

impl Default for Gt7Config {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{RECV_PORT}"),
            console_host: "192.168.1.100".into(),
            send_port: SEND_PORT,
            idle_timeout_ms: 10_000,
            heartbeat_every: 100,
            layout: LayoutKind::Compact,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Gt7Config {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Live GT7 session: one socket, one sequential receive loop.
pub struct Gt7Session {
    cfg: Gt7Config,
}

impl Gt7Session {
    pub fn new(cfg: Gt7Config) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &Gt7Config {
        &self.cfg
    }

    /// Runs the session on its own task and returns the frame receiver.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (FrameRx, JoinHandle<Result<SessionStats, IngestError>>) {
        let (tx, rx) = channel(self.cfg.channel_capacity);
        let handle = tokio::spawn(async move { self.run(tx, cancel).await });
        (rx, handle)
    }
}

async fn resolve_console(host: &str, port: u16) -> Result<SocketAddr, IngestError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| IngestError::Resolve { host: host.to_string(), source: Some(e) })?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| IngestError::Resolve { host: host.to_string(), source: None })
}

async fn send_heartbeat(socket: &UdpSocket, peer: SocketAddr, stats: &mut SessionStats) {
    match socket.send_to(HEARTBEAT, peer).await {
        Ok(_) => {
            stats.heartbeats += 1;
            debug!(%peer, "heartbeat sent");
        }
        Err(e) => warn!(%peer, error = %e, "heartbeat send failed"),
    }
}

#[async_trait::async_trait]
impl TelemetrySource for Gt7Session {
    async fn run(
        &self,
        tx: FrameTx,
        cancel: CancellationToken,
    ) -> Result<SessionStats, IngestError> {
        let socket = UdpSocket::bind(&self.cfg.bind_addr)
            .await
            .map_err(|source| IngestError::Bind { addr: self.cfg.bind_addr.clone(), source })?;
        let peer = resolve_console(&self.cfg.console_host, self.cfg.send_port).await?;
        info!(local = ?socket.local_addr().ok(), %peer, "GT7 session started");

        let layout = self.cfg.layout.table();
        let idle = self.cfg.idle_timeout();
        let heartbeat_every = self.cfg.heartbeat_every.max(1);
        let mut stats = SessionStats::default();
        let mut since_heartbeat = 0u32;
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        send_heartbeat(&socket, peer, &mut stats).await;

        while !cancel.is_cancelled() {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = time::timeout(idle, socket.recv_from(&mut buf)) => r,
            };
            match received {
                Ok(Ok((len, _src))) => {
                    stats.datagrams += 1;
                    since_heartbeat += 1;
                    match decode_datagram(&buf[..len], layout) {
                        Ok(frame) => {
                            trace!(
                                frame_id = frame.frame_id,
                                lap = frame.lap_count,
                                rpm = frame.engine_rpm,
                                gear = frame.gear.current,
                                "frame"
                            );
                            match tx.try_send(frame) {
                                Ok(()) => stats.frames += 1,
                                Err(TrySendError::Full(_)) => stats.dropped += 1,
                                Err(TrySendError::Closed(_)) => {
                                    info!("frame consumer gone, stopping GT7 session");
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            stats.rejected += 1;
                            debug!(len, error = %e, "dropping GT7 datagram");
                        }
                    }
                    if since_heartbeat >= heartbeat_every {
                        send_heartbeat(&socket, peer, &mut stats).await;
                        since_heartbeat = 0;
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "GT7 receive error");
                    send_heartbeat(&socket, peer, &mut stats).await;
                    since_heartbeat = 0;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = time::sleep(RECV_ERROR_BACKOFF) => {}
                    }
                }
                Err(_) => {
                    stats.timeouts += 1;
                    debug!(?idle, "no GT7 data, re-sending heartbeat");
                    send_heartbeat(&socket, peer, &mut stats).await;
                    since_heartbeat = 0;
                }
            }
        }

        info!(?stats, "GT7 session stopped");
        Ok(stats)
    }
}
