//! Lap segmentation and plot reduction over an ordered frame sequence.

use model::*;
use serde::Serialize;
use tracing::{debug, trace};

/// Streaming lap analyzer. Feed frames in receive order.
#[derive(Debug, Clone)]
pub struct LapAnalyzer {
    target_lap: i16,
    // None until the first frame; no real lap counter can match it.
    previous_lap: Option<i16>,
    retained: Vec<TelemetryFrame>,
    laps: Vec<LapRecord>,
    frames_seen: u64,
}

impl LapAnalyzer {
    pub fn new(target_lap: i16) -> Self {
        Self {
            target_lap,
            previous_lap: None,
            retained: Vec::new(),
            laps: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Consumes one frame. Returns the lap record if this frame closed a lap.
    ///
    /// A boundary only counts once the console reports a best lap time, so
    /// the pre-race lap counter changes are ignored.
    pub fn push(&mut self, frame: TelemetryFrame) -> Option<&LapRecord> {
        self.frames_seen += 1;
        if !frame.paused() && frame.meters_per_second > 0.0 {
            trace!(
                gear = frame.gear.current,
                rpm = frame.engine_rpm,
                brake = frame.brake,
                throttle = frame.throttle,
                kph = frame.speed_kph(),
                "moving"
            );
        }
        let boundary =
            self.previous_lap != Some(frame.lap_count) && frame.best_lap_time.is_set();
        if boundary {
            let record = LapRecord::at_boundary(&frame, self.previous_lap);
            debug!(lap = record.lap, completed = ?record.completed_lap, best = %record.best_lap_time, "lap boundary");
            self.laps.push(record);
        }
        self.previous_lap = Some(frame.lap_count);
        if frame.lap_count == self.target_lap {
            self.retained.push(frame);
        }
        if boundary {
            self.laps.last()
        } else {
            None
        }
    }

    pub fn retained(&self) -> &[TelemetryFrame] {
        &self.retained
    }

    pub fn laps(&self) -> &[LapRecord] {
        &self.laps
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Dataset for what has been seen so far, without consuming the analyzer.
    pub fn snapshot(&self, label: &str) -> Dataset {
        let mut ds = Dataset::new(label, self.target_lap);
        ds.points = trajectory(&self.retained);
        ds.laps = self.laps.clone();
        ds.frames_seen = self.frames_seen;
        ds
    }

    pub fn finish(self) -> LapAnalysis {
        LapAnalysis {
            target_lap: self.target_lap,
            retained: self.retained,
            laps: self.laps,
            frames_seen: self.frames_seen,
        }
    }
}

/// Output of one analysis run over a finite frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapAnalysis {
    pub target_lap: i16,
    pub retained: Vec<TelemetryFrame>,
    pub laps: Vec<LapRecord>,
    pub frames_seen: u64,
}

impl LapAnalysis {
    pub fn summary_lines(&self) -> Vec<String> {
        self.laps.iter().map(ToString::to_string).collect()
    }

    pub fn into_dataset(self, label: &str) -> Dataset {
        let mut ds = Dataset::new(label, self.target_lap);
        ds.points = trajectory(&self.retained);
        ds.laps = self.laps;
        ds.frames_seen = self.frames_seen;
        ds
    }
}

pub fn analyze<I>(frames: I, target_lap: i16) -> LapAnalysis
where
    I: IntoIterator<Item = TelemetryFrame>,
{
    let mut analyzer = LapAnalyzer::new(target_lap);
    for frame in frames {
        analyzer.push(frame);
    }
    analyzer.finish()
}

/// Plot orientation: x stays, z is negated into y.
pub fn trajectory_point(frame: &TelemetryFrame) -> TrajectoryPoint {
    TrajectoryPoint {
        x: frame.position.x as f64,
        y: -(frame.position.z as f64),
        brake: frame.brake as f64,
        throttle: frame.throttle as f64,
    }
}

pub fn trajectory(frames: &[TelemetryFrame]) -> Vec<TrajectoryPoint> {
    frames.iter().map(trajectory_point).collect()
}
