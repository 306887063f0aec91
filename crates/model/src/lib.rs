//! Value types shared by the ingest, analysis and io crates.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {} {}}}", self.x, self.y, self.z)
    }
}

/// Per-wheel values, front-left first.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Wheels<T> {
    pub fl: T,
    pub fr: T,
    pub rl: T,
    pub rr: T,
}

impl<T: Copy> Wheels<T> {
    pub fn to_array(&self) -> [T; 4] {
        [self.fl, self.fr, self.rl, self.rr]
    }

    pub fn from_array([fl, fr, rl, rr]: [T; 4]) -> Self {
        Self { fl, fr, rl, rr }
    }
}

/// Millisecond duration as reported by the console. `-1` means "not set yet".
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LapTime(pub i32);

impl LapTime {
    pub const UNSET: LapTime = LapTime(-1);

    pub fn is_set(self) -> bool {
        self != Self::UNSET
    }

    pub fn millis(self) -> i32 {
        self.0
    }
}

impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            return f.write_str("-");
        }
        let ms = self.0 as u32;
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        write!(f, "{}:{:02}.{:03}", minutes, seconds, ms % 1000)
    }
}

/// Current and suggested gear, unpacked from the wire nibble byte.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct GearSelection {
    pub current: u8,
    /// 15 when the game has no suggestion.
    pub suggested: u8,
}

impl GearSelection {
    pub const NO_SUGGESTION: u8 = 0x0F;

    pub fn from_packed(bits: u8) -> Self {
        Self { current: bits & 0x0F, suggested: bits >> 4 }
    }

    pub fn packed(self) -> u8 {
        (self.current & 0x0F) | (self.suggested << 4)
    }

    pub fn suggestion(self) -> Option<u8> {
        (self.suggested != Self::NO_SUGGESTION).then_some(self.suggested)
    }
}

bitflags! {
    /// Simulation state word. Bit positions match the console's wire format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SimulatorFlags: u16 {
        const CAR_ON_TRACK = 1 << 0;
        const PAUSED = 1 << 1;
        const LOADING_OR_PROCESSING = 1 << 2;
        /// Not fully understood; set while a gear is engaged.
        const IN_GEAR = 1 << 3;
        const HAS_TURBO = 1 << 4;
        const REV_LIMITER_ALERT = 1 << 5;
        const HAND_BRAKE = 1 << 6;
        const LIGHTS = 1 << 7;
        const HIGH_BEAM = 1 << 8;
        const LOW_BEAM = 1 << 9;
        const ASM = 1 << 10;
        const TCS = 1 << 11;
    }
}

/// One decoded telemetry sample.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TelemetryFrame {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Vec3,
    pub relative_orientation_to_north: f32,
    pub angular_velocity: Vec3,
    pub body_height: f32,
    pub engine_rpm: f32,
    pub gas_level: f32,
    pub gas_capacity: f32,
    pub meters_per_second: f32,
    pub turbo_boost: f32,
    pub oil_pressure: f32,
    pub water_temperature: f32,
    pub oil_temperature: f32,
    pub tire_surface_temperature: Wheels<f32>,
    /// Console sequence number, diagnostics only.
    pub frame_id: i32,
    pub lap_count: i16,
    pub laps_in_race: i16,
    pub best_lap_time: LapTime,
    pub last_lap_time: LapTime,
    pub time_of_day: LapTime,
    pub pre_race_position: i16,
    pub cars_at_pre_race: i16,
    pub min_alert_rpm: i16,
    pub max_alert_rpm: i16,
    pub calculated_max_speed: i16,
    pub flags: SimulatorFlags,
    pub gear: GearSelection,
    pub throttle: u8,
    pub brake: u8,
    pub road_plane: Vec3,
    pub road_plane_distance: f32,
    pub wheel_revs_per_second: Wheels<f32>,
    pub tire_radius: Wheels<f32>,
    pub suspension_height: Wheels<f32>,
    pub clutch_pedal: f32,
    pub clutch_engagement: f32,
    pub rpm_from_clutch_to_gearbox: f32,
    pub transmission_top_speed: f32,
    /// Entries past the car's real gear count hold whatever the game copied there.
    pub gear_ratios: [f32; 8],
    pub car_code: i32,
}

impl TelemetryFrame {
    pub fn handbrake(&self) -> bool {
        self.flags.contains(SimulatorFlags::HAND_BRAKE)
    }

    pub fn on_track(&self) -> bool {
        self.flags.contains(SimulatorFlags::CAR_ON_TRACK)
    }

    pub fn paused(&self) -> bool {
        self.flags.contains(SimulatorFlags::PAUSED)
    }

    pub fn speed_kph(&self) -> f32 {
        self.meters_per_second * 3.6
    }
}

impl Default for TelemetryFrame {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            velocity: Vec3::default(),
            rotation: Vec3::default(),
            relative_orientation_to_north: 0.0,
            angular_velocity: Vec3::default(),
            body_height: 0.0,
            engine_rpm: 0.0,
            gas_level: 0.0,
            gas_capacity: 0.0,
            meters_per_second: 0.0,
            turbo_boost: 0.0,
            oil_pressure: 0.0,
            water_temperature: 0.0,
            oil_temperature: 0.0,
            tire_surface_temperature: Wheels::default(),
            frame_id: 0,
            lap_count: 0,
            laps_in_race: 0,
            best_lap_time: LapTime::UNSET,
            last_lap_time: LapTime::UNSET,
            time_of_day: LapTime(0),
            pre_race_position: -1,
            cars_at_pre_race: -1,
            min_alert_rpm: 0,
            max_alert_rpm: 0,
            calculated_max_speed: 0,
            flags: SimulatorFlags::empty(),
            gear: GearSelection::default(),
            throttle: 0,
            brake: 0,
            road_plane: Vec3::default(),
            road_plane_distance: 0.0,
            wheel_revs_per_second: Wheels::default(),
            tire_radius: Wheels::default(),
            suspension_height: Wheels::default(),
            clutch_pedal: 0.0,
            clutch_engagement: 0.0,
            rpm_from_clutch_to_gearbox: 0.0,
            transmission_top_speed: 0.0,
            gear_ratios: [0.0; 8],
            car_code: 0,
        }
    }
}

/// Snapshot taken at the frame where the lap counter changed.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapRecord {
    /// Lap counter reported by the boundary frame.
    pub lap: i16,
    /// Lap counter of the frame before the boundary, `None` at stream start.
    pub completed_lap: Option<i16>,
    pub time_of_day: LapTime,
    pub best_lap_time: LapTime,
    pub last_lap_time: LapTime,
    pub throttle: u8,
    pub brake: u8,
    pub speed: f32,
    pub position: Vec3,
    pub road_plane: Vec3,
    pub road_plane_distance: f32,
}

impl LapRecord {
    pub fn at_boundary(frame: &TelemetryFrame, completed_lap: Option<i16>) -> Self {
        Self {
            lap: frame.lap_count,
            completed_lap,
            time_of_day: frame.time_of_day,
            best_lap_time: frame.best_lap_time,
            last_lap_time: frame.last_lap_time,
            throttle: frame.throttle,
            brake: frame.brake,
            speed: frame.meters_per_second,
            position: frame.position,
            road_plane: frame.road_plane,
            road_plane_distance: frame.road_plane_distance,
        }
    }
}

// Summary line: time of day, lap, best lap, throttle, brake, speed, position, road plane, distance.
impl fmt::Display for LapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.time_of_day,
            self.lap,
            self.best_lap_time,
            self.throttle,
            self.brake,
            self.speed,
            self.position,
            self.road_plane,
            self.road_plane_distance
        )
    }
}

/// Plot point: longitudinal position, flipped lateral position, brake, throttle.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    pub brake: f64,
    pub throttle: f64,
}

impl TrajectoryPoint {
    pub fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.brake, self.throttle]
    }
}

/// Result of one analysis run, handed to the presentation layer.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Dataset {
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub label: String,
    pub target_lap: i16,
    #[serde(default)]
    pub points: Vec<TrajectoryPoint>,
    #[serde(default)]
    pub laps: Vec<LapRecord>,
    pub frames_seen: u64,
}

impl Dataset {
    pub fn new(label: impl Into<String>, target_lap: i16) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            target_lap,
            points: Vec::new(),
            laps: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.laps.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gear_nibbles_unpack() {
        let g = GearSelection::from_packed(0x43);
        assert_eq!(g.current, 3);
        assert_eq!(g.suggested, 4);
        assert_eq!(g.packed(), 0x43);
        assert_eq!(GearSelection::from_packed(0xF2).suggestion(), None);
    }

    #[test]
    fn lap_time_display() {
        assert_eq!(LapTime(83_456).to_string(), "1:23.456");
        assert_eq!(LapTime(500).to_string(), "0:00.500");
        assert_eq!(LapTime::UNSET.to_string(), "-");
        assert!(!LapTime::UNSET.is_set());
        assert!(LapTime(0).is_set());
    }

    #[test]
    fn flags_keep_wire_bits() {
        let f = SimulatorFlags::from_bits_retain(0b1100_0100_0001);
        assert!(f.contains(SimulatorFlags::CAR_ON_TRACK));
        assert!(f.contains(SimulatorFlags::HAND_BRAKE));
        assert!(f.contains(SimulatorFlags::ASM));
        assert!(f.contains(SimulatorFlags::TCS));
        assert!(!f.contains(SimulatorFlags::PAUSED));
        assert_eq!(SimulatorFlags::TCS.bits(), 0x0800);
    }

    #[test]
    fn frame_status_helpers() {
        let f = TelemetryFrame {
            flags: SimulatorFlags::PAUSED | SimulatorFlags::HAND_BRAKE,
            meters_per_second: 25.0,
            ..TelemetryFrame::default()
        };
        assert!(f.paused());
        assert!(f.handbrake());
        assert!(!f.on_track());
        assert!((f.speed_kph() - 90.0).abs() < 1e-4);
    }

    #[test]
    fn lap_record_line_field_order() {
        let frame = TelemetryFrame {
            time_of_day: LapTime(61_000),
            lap_count: 2,
            best_lap_time: LapTime(500),
            throttle: 255,
            brake: 0,
            meters_per_second: 42.5,
            position: Vec3::new(1.0, 2.0, 3.0),
            road_plane: Vec3::new(0.0, 1.0, 0.0),
            road_plane_distance: -0.5,
            ..TelemetryFrame::default()
        };
        let line = LapRecord::at_boundary(&frame, Some(1)).to_string();
        assert_eq!(line, "1:01.000,2,0:00.500,255,0,42.5,{1 2 3},{0 1 0},-0.5");
    }

    #[test]
    fn dataset_json_uses_simple_uuid() {
        let ds = Dataset::new("reference", 3);
        let s = serde_json::to_string(&ds).unwrap();
        assert!(s.contains(&ds.id.simple().to_string()));
        let back: Dataset = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ds);
    }
}
