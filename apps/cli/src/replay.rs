use std::path::Path;

use analysis::LapAnalyzer;
use anyhow::{Context, Result};
use iox::CaptureReader;
use lapscope_ingest_gt7::{FrameLayout, LayoutKind};
use model::Dataset;
use tracing::info;

use crate::AnalyzeArgs;

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let layout = LayoutKind::from(args.layout).table();

    let mut datasets = vec![load_dataset(&args.file, layout, args.lap)?];
    if let Some(compare) = &args.compare {
        let lap = args.compare_lap.unwrap_or(args.lap);
        datasets.push(load_dataset(compare, layout, lap)?);
    }

    for ds in &datasets {
        println!("# {} lap {} ({} points, {} frames)", ds.label, ds.target_lap, ds.points.len(), ds.frames_seen);
        for line in ds.summary_lines() {
            println!("{line}");
        }
    }

    if let Some(path) = &args.csv {
        iox::export_laps_csv(&datasets, path)?;
        info!(path = %path.display(), "lap summaries written");
    }
    if let Some(path) = &args.points {
        iox::export_points_csv(&datasets[0], path)?;
        info!(path = %path.display(), "reference trajectory written");
    }
    if let Some(path) = &args.ndjson {
        iox::export_ndjson(&datasets, path)?;
        info!(path = %path.display(), datasets = datasets.len(), "datasets written");
    }
    Ok(())
}

/// Replays one capture file through the lap analyzer. The dataset is labelled
/// with the file name.
pub fn load_dataset(path: &Path, layout: &FrameLayout, lap: i16) -> Result<Dataset> {
    let reader = CaptureReader::open(path, layout.size)?;
    let mut analyzer = LapAnalyzer::new(lap);
    for buf in reader {
        let buf = buf?;
        let frame = layout
            .decode(&buf)
            .with_context(|| format!("decode frame {} of {}", analyzer.frames_seen(), path.display()))?;
        analyzer.push(frame);
    }
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!(file = %label, frames = analyzer.frames_seen(), laps = analyzer.laps().len(), "capture analyzed");
    Ok(analyzer.finish().into_dataset(&label))
}
