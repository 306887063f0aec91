//! Source-agnostic plumbing shared by live telemetry connectors.

use model::TelemetryFrame;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use tokio_util::sync::CancellationToken;

/// Hand-off capacity used when the caller has no opinion.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unable to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to resolve console address {host}")]
    Resolve {
        host: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Counters kept by a running session. Only the session loop mutates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Datagrams received, valid or not.
    pub datagrams: u64,
    /// Frames decoded and handed to the consumer.
    pub frames: u64,
    /// Datagrams dropped because they failed decryption or decoding.
    pub rejected: u64,
    /// Decoded frames dropped because the consumer was not keeping up.
    pub dropped: u64,
    /// Heartbeats successfully sent.
    pub heartbeats: u64,
    pub timeouts: u64,
}

pub type FrameTx = mpsc::Sender<TelemetryFrame>;
pub type FrameRx = mpsc::Receiver<TelemetryFrame>;

pub fn channel(capacity: usize) -> (FrameTx, FrameRx) {
    mpsc::channel(capacity.max(1))
}

/// Trait for any live source connector
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Runs until `cancel` fires or the receiving half of `tx` is dropped.
    async fn run(
        &self,
        tx: FrameTx,
        cancel: CancellationToken,
    ) -> Result<SessionStats, IngestError>;
}
