use std::sync::Arc;

use analysis::LapAnalyzer;
use anyhow::{Context, Result};
use iox::{CaptureFormat, CaptureWriter};
use lapscope_ingest_core::{CancellationToken, FrameRx};
use lapscope_ingest_gt7::{FrameLayout, Gt7Config, Gt7Session};
use model::{Dataset, TelemetryFrame};
use parking_lot::Mutex;
use tokio::signal;
use tracing::{info, warn};

use crate::LiveArgs;

/// Analyzer state shared between the frame pump and whoever reports on it.
pub struct LiveStore {
    analyzer: Mutex<LapAnalyzer>,
}

impl LiveStore {
    pub fn new(target_lap: i16) -> Self {
        Self { analyzer: Mutex::new(LapAnalyzer::new(target_lap)) }
    }

    /// Feeds one frame; returns the summary line when it closed a lap.
    pub fn push(&self, frame: TelemetryFrame) -> Option<String> {
        let mut analyzer = self.analyzer.lock();
        analyzer.push(frame).map(ToString::to_string)
    }

    pub fn snapshot(&self, label: &str) -> Dataset {
        self.analyzer.lock().snapshot(label)
    }
}

pub async fn run(args: LiveArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => Gt7Config::from_json_file(path)?,
        None => Gt7Config::default(),
    };
    if let Some(host) = args.host {
        cfg.console_host = host;
    }
    let layout = cfg.layout.table();
    let label = cfg.console_host.clone();

    let recorder = match &args.record {
        Some(path) => Some(CaptureWriter::create(path, CaptureFormat::for_path(path))?),
        None => None,
    };

    let store = Arc::new(LiveStore::new(args.lap));
    let cancel = CancellationToken::new();
    let gt7 = Gt7Session::new(cfg);
    info!(
        console = %gt7.config().console_host,
        bind = %gt7.config().bind_addr,
        layout = layout.name,
        target_lap = args.lap,
        "connecting"
    );
    let (rx, session) = gt7.spawn(cancel.clone());
    let mut pump = tokio::spawn(pump_frames(rx, store.clone(), recorder, layout));

    let finished = tokio::select! {
        r = signal::ctrl_c() => {
            r.context("listen for ctrl-c")?;
            info!("interrupted, stopping session");
            None
        }
        r = &mut pump => Some(r),
    };
    cancel.cancel();

    let stats = session.await.context("session task failed")??;
    let pumped = match finished {
        Some(r) => r,
        None => pump.await,
    };
    let recorded = pumped.context("frame pump failed")??;

    let ds = store.snapshot(&label);
    info!(
        frames = ds.frames_seen,
        laps = ds.laps.len(),
        points = ds.points.len(),
        dropped = stats.dropped,
        rejected = stats.rejected,
        "live session finished"
    );
    if let (Some(path), Some(frames)) = (&args.record, recorded) {
        info!(path = %path.display(), frames, "capture saved");
    }
    Ok(())
}

/// Drains the session channel until the session stops. Returns the number of
/// recorded frames when recording.
async fn pump_frames(
    mut rx: FrameRx,
    store: Arc<LiveStore>,
    mut recorder: Option<CaptureWriter>,
    layout: &'static FrameLayout,
) -> Result<Option<u64>> {
    while let Some(frame) = rx.recv().await {
        if let Some(w) = recorder.as_mut() {
            if let Err(e) = w.write_frame(&layout.encode(&frame)) {
                warn!(error = %e, "recording stopped");
                recorder = None;
            }
        }
        if let Some(line) = store.push(frame) {
            println!("{line}");
        }
    }
    recorder.map(CaptureWriter::finish).transpose().map_err(Into::into)
}
