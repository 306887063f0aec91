use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use model::{Dataset, LapRecord};
use serde::{Deserialize, Serialize};

/// Plot points, one row per retained frame: `x,y,brake,throttle`.
pub fn export_points_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for p in &dataset.points {
        w.serialize(p)?;
    }
    w.flush()?;
    Ok(())
}

/// Lap summaries of every dataset, flattened to one row per lap.
pub fn export_laps_csv(datasets: &[Dataset], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for ds in datasets {
        for lap in &ds.laps {
            w.serialize(LapRow::new(&ds.label, lap))?;
        }
    }
    w.flush()?;
    Ok(())
}

pub fn export_ndjson(datasets: &[Dataset], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for ds in datasets {
        let s = serde_json::to_string(ds)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_ndjson(path: &Path) -> Result<Vec<Dataset>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = vec![];
    for line in BufReader::new(f).lines() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&s)?);
    }
    Ok(out)
}

#[derive(Serialize, Deserialize)]
struct LapRow {
    dataset: String,
    lap: i16,
    completed_lap: Option<i16>,
    time_of_day_ms: i32,
    best_lap_ms: i32,
    last_lap_ms: i32,
    throttle: u8,
    brake: u8,
    speed: f32,
    pos_x: f32,
    pos_y: f32,
    pos_z: f32,
    plane_x: f32,
    plane_y: f32,
    plane_z: f32,
    plane_distance: f32,
}

impl LapRow {
    fn new(dataset: &str, r: &LapRecord) -> Self {
        Self {
            dataset: dataset.to_string(),
            lap: r.lap,
            completed_lap: r.completed_lap,
            time_of_day_ms: r.time_of_day.millis(),
            best_lap_ms: r.best_lap_time.millis(),
            last_lap_ms: r.last_lap_time.millis(),
            throttle: r.throttle,
            brake: r.brake,
            speed: r.speed,
            pos_x: r.position.x,
            pos_y: r.position.y,
            pos_z: r.position.z,
            plane_x: r.road_plane.x,
            plane_y: r.road_plane.y,
            plane_z: r.road_plane.z,
            plane_distance: r.road_plane_distance,
        }
    }
}
