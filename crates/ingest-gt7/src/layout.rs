//! Fixed-offset frame layouts and the decoder that walks them.
//!
//! Live datagrams and most capture files use the 296-byte [`FrameLayout::COMPACT`]
//! table. Some recorders write 304-byte frames with an extra reserved block in
//! front of the gear-ratio table; [`FrameLayout::PADDED`] covers those. Both go
//! through the same [`FrameLayout::decode`].

use byteorder::{ByteOrder, LittleEndian};
use model::{GearSelection, LapTime, SimulatorFlags, TelemetryFrame, Vec3, Wheels};
use serde::{Deserialize, Serialize};

use crate::cipher::{self, CipherError, MAGIC};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    Short { expected: usize, actual: usize },
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Byte offsets of every exposed field. Scalars are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub name: &'static str,
    pub size: usize,
    pub magic: usize,
    pub position: usize,
    pub velocity: usize,
    pub rotation: usize,
    pub relative_orientation_to_north: usize,
    pub angular_velocity: usize,
    pub body_height: usize,
    pub engine_rpm: usize,
    pub gas_level: usize,
    pub gas_capacity: usize,
    pub meters_per_second: usize,
    pub turbo_boost: usize,
    pub oil_pressure: usize,
    pub water_temperature: usize,
    pub oil_temperature: usize,
    pub tire_surface_temperature: usize,
    pub frame_id: usize,
    pub lap_count: usize,
    pub laps_in_race: usize,
    pub best_lap_time: usize,
    pub last_lap_time: usize,
    pub time_of_day: usize,
    pub pre_race_position: usize,
    pub cars_at_pre_race: usize,
    pub min_alert_rpm: usize,
    pub max_alert_rpm: usize,
    pub calculated_max_speed: usize,
    pub flags: usize,
    pub gear: usize,
    pub throttle: usize,
    pub brake: usize,
    pub road_plane: usize,
    pub road_plane_distance: usize,
    pub wheel_revs_per_second: usize,
    pub tire_radius: usize,
    pub suspension_height: usize,
    pub clutch_pedal: usize,
    pub clutch_engagement: usize,
    pub rpm_from_clutch_to_gearbox: usize,
    pub transmission_top_speed: usize,
    pub gear_ratios: usize,
    pub car_code: usize,
}

impl FrameLayout {
    // 0x40..0x44 is the nonce seed, 0x93 is padding, 0xD4..0xF4 is unused by the game.
    pub const COMPACT: FrameLayout = FrameLayout {
        name: "compact",
        size: 0x128,
        magic: 0x00,
        position: 0x04,
        velocity: 0x10,
        rotation: 0x1C,
        relative_orientation_to_north: 0x28,
        angular_velocity: 0x2C,
        body_height: 0x38,
        engine_rpm: 0x3C,
        gas_level: 0x44,
        gas_capacity: 0x48,
        meters_per_second: 0x4C,
        turbo_boost: 0x50,
        oil_pressure: 0x54,
        water_temperature: 0x58,
        oil_temperature: 0x5C,
        tire_surface_temperature: 0x60,
        frame_id: 0x70,
        lap_count: 0x74,
        laps_in_race: 0x76,
        best_lap_time: 0x78,
        last_lap_time: 0x7C,
        time_of_day: 0x80,
        pre_race_position: 0x84,
        cars_at_pre_race: 0x86,
        min_alert_rpm: 0x88,
        max_alert_rpm: 0x8A,
        calculated_max_speed: 0x8C,
        flags: 0x8E,
        gear: 0x90,
        throttle: 0x91,
        brake: 0x92,
        road_plane: 0x94,
        road_plane_distance: 0xA0,
        wheel_revs_per_second: 0xA4,
        tire_radius: 0xB4,
        suspension_height: 0xC4,
        clutch_pedal: 0xF4,
        clutch_engagement: 0xF8,
        rpm_from_clutch_to_gearbox: 0xFC,
        transmission_top_speed: 0x100,
        gear_ratios: 0x104,
        car_code: 0x124,
    };

    /// Compact layout plus 8 reserved bytes at 0x104.
    pub const PADDED: FrameLayout = FrameLayout {
        name: "padded",
        size: 0x130,
        gear_ratios: 0x10C,
        car_code: 0x12C,
        ..FrameLayout::COMPACT
    };

    pub fn from_size(size: usize) -> Option<&'static FrameLayout> {
        [&Self::COMPACT, &Self::PADDED]
            .into_iter()
            .find(|l| l.size == size)
    }

    /// Decodes a plaintext frame. Bytes past `size` are ignored.
    pub fn decode(&self, buf: &[u8]) -> Result<TelemetryFrame, DecodeError> {
        if buf.len() < self.size {
            return Err(DecodeError::Short { expected: self.size, actual: buf.len() });
        }
        let r = Reader(&buf[..self.size]);
        let mut gear_ratios = [0f32; 8];
        LittleEndian::read_f32_into(&r.0[self.gear_ratios..self.gear_ratios + 32], &mut gear_ratios);

        Ok(TelemetryFrame {
            position: r.vec3(self.position),
            velocity: r.vec3(self.velocity),
            rotation: r.vec3(self.rotation),
            relative_orientation_to_north: r.f32(self.relative_orientation_to_north),
            angular_velocity: r.vec3(self.angular_velocity),
            body_height: r.f32(self.body_height),
            engine_rpm: r.f32(self.engine_rpm),
            gas_level: r.f32(self.gas_level),
            gas_capacity: r.f32(self.gas_capacity),
            meters_per_second: r.f32(self.meters_per_second),
            turbo_boost: r.f32(self.turbo_boost),
            oil_pressure: r.f32(self.oil_pressure),
            water_temperature: r.f32(self.water_temperature),
            oil_temperature: r.f32(self.oil_temperature),
            tire_surface_temperature: r.wheels(self.tire_surface_temperature),
            frame_id: r.i32(self.frame_id),
            lap_count: r.i16(self.lap_count),
            laps_in_race: r.i16(self.laps_in_race),
            best_lap_time: LapTime(r.i32(self.best_lap_time)),
            last_lap_time: LapTime(r.i32(self.last_lap_time)),
            time_of_day: LapTime(r.i32(self.time_of_day)),
            pre_race_position: r.i16(self.pre_race_position),
            cars_at_pre_race: r.i16(self.cars_at_pre_race),
            min_alert_rpm: r.i16(self.min_alert_rpm),
            max_alert_rpm: r.i16(self.max_alert_rpm),
            calculated_max_speed: r.i16(self.calculated_max_speed),
            flags: SimulatorFlags::from_bits_retain(LittleEndian::read_u16(&r.0[self.flags..])),
            gear: GearSelection::from_packed(r.0[self.gear]),
            throttle: r.0[self.throttle],
            brake: r.0[self.brake],
            road_plane: r.vec3(self.road_plane),
            road_plane_distance: r.f32(self.road_plane_distance),
            wheel_revs_per_second: r.wheels(self.wheel_revs_per_second),
            tire_radius: r.wheels(self.tire_radius),
            suspension_height: r.wheels(self.suspension_height),
            clutch_pedal: r.f32(self.clutch_pedal),
            clutch_engagement: r.f32(self.clutch_engagement),
            rpm_from_clutch_to_gearbox: r.f32(self.rpm_from_clutch_to_gearbox),
            transmission_top_speed: r.f32(self.transmission_top_speed),
            gear_ratios,
            car_code: r.i32(self.car_code),
        })
    }

    /// Writes `frame` as a plaintext frame of `size` bytes, magic included.
    /// Reserved regions are zeroed.
    pub fn encode(&self, frame: &TelemetryFrame) -> Vec<u8> {
        let mut buf = vec![0u8; self.size];
        let mut w = Writer(&mut buf);
        w.u32(self.magic, MAGIC);
        w.vec3(self.position, frame.position);
        w.vec3(self.velocity, frame.velocity);
        w.vec3(self.rotation, frame.rotation);
        w.f32(self.relative_orientation_to_north, frame.relative_orientation_to_north);
        w.vec3(self.angular_velocity, frame.angular_velocity);
        w.f32(self.body_height, frame.body_height);
        w.f32(self.engine_rpm, frame.engine_rpm);
        w.f32(self.gas_level, frame.gas_level);
        w.f32(self.gas_capacity, frame.gas_capacity);
        w.f32(self.meters_per_second, frame.meters_per_second);
        w.f32(self.turbo_boost, frame.turbo_boost);
        w.f32(self.oil_pressure, frame.oil_pressure);
        w.f32(self.water_temperature, frame.water_temperature);
        w.f32(self.oil_temperature, frame.oil_temperature);
        w.wheels(self.tire_surface_temperature, frame.tire_surface_temperature);
        w.i32(self.frame_id, frame.frame_id);
        w.i16(self.lap_count, frame.lap_count);
        w.i16(self.laps_in_race, frame.laps_in_race);
        w.i32(self.best_lap_time, frame.best_lap_time.millis());
        w.i32(self.last_lap_time, frame.last_lap_time.millis());
        w.i32(self.time_of_day, frame.time_of_day.millis());
        w.i16(self.pre_race_position, frame.pre_race_position);
        w.i16(self.cars_at_pre_race, frame.cars_at_pre_race);
        w.i16(self.min_alert_rpm, frame.min_alert_rpm);
        w.i16(self.max_alert_rpm, frame.max_alert_rpm);
        w.i16(self.calculated_max_speed, frame.calculated_max_speed);
        LittleEndian::write_u16(&mut w.0[self.flags..], frame.flags.bits());
        w.0[self.gear] = frame.gear.packed();
        w.0[self.throttle] = frame.throttle;
        w.0[self.brake] = frame.brake;
        w.vec3(self.road_plane, frame.road_plane);
        w.f32(self.road_plane_distance, frame.road_plane_distance);
        w.wheels(self.wheel_revs_per_second, frame.wheel_revs_per_second);
        w.wheels(self.tire_radius, frame.tire_radius);
        w.wheels(self.suspension_height, frame.suspension_height);
        w.f32(self.clutch_pedal, frame.clutch_pedal);
        w.f32(self.clutch_engagement, frame.clutch_engagement);
        w.f32(self.rpm_from_clutch_to_gearbox, frame.rpm_from_clutch_to_gearbox);
        w.f32(self.transmission_top_speed, frame.transmission_top_speed);
        LittleEndian::write_f32_into(
            &frame.gear_ratios,
            &mut w.0[self.gear_ratios..self.gear_ratios + 32],
        );
        w.i32(self.car_code, frame.car_code);
        buf
    }
}

/// Serializable selector for the two known layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Compact,
    Padded,
}

impl LayoutKind {
    pub fn table(self) -> &'static FrameLayout {
        match self {
            LayoutKind::Compact => &FrameLayout::COMPACT,
            LayoutKind::Padded => &FrameLayout::PADDED,
        }
    }
}

/// Live path: decrypt, check the magic, then decode.
pub fn decode_datagram(raw: &[u8], layout: &FrameLayout) -> Result<TelemetryFrame, DecodeError> {
    let mut buf = raw.to_vec();
    cipher::decrypt_in_place(&mut buf)?;
    layout.decode(&buf)
}

struct Reader<'a>(&'a [u8]);

impl Reader<'_> {
    fn f32(&self, off: usize) -> f32 {
        LittleEndian::read_f32(&self.0[off..])
    }
    fn i32(&self, off: usize) -> i32 {
        LittleEndian::read_i32(&self.0[off..])
    }
    fn i16(&self, off: usize) -> i16 {
        LittleEndian::read_i16(&self.0[off..])
    }
    fn vec3(&self, off: usize) -> Vec3 {
        Vec3::new(self.f32(off), self.f32(off + 4), self.f32(off + 8))
    }
    fn wheels(&self, off: usize) -> Wheels<f32> {
        Wheels::from_array([self.f32(off), self.f32(off + 4), self.f32(off + 8), self.f32(off + 12)])
    }
}

struct Writer<'a>(&'a mut [u8]);

impl Writer<'_> {
    fn f32(&mut self, off: usize, v: f32) {
        LittleEndian::write_f32(&mut self.0[off..], v);
    }
    fn u32(&mut self, off: usize, v: u32) {
        LittleEndian::write_u32(&mut self.0[off..], v);
    }
    fn i32(&mut self, off: usize, v: i32) {
        LittleEndian::write_i32(&mut self.0[off..], v);
    }
    fn i16(&mut self, off: usize, v: i16) {
        LittleEndian::write_i16(&mut self.0[off..], v);
    }
    fn vec3(&mut self, off: usize, v: Vec3) {
        self.f32(off, v.x);
        self.f32(off + 4, v.y);
        self.f32(off + 8, v.z);
    }
    fn wheels(&mut self, off: usize, v: Wheels<f32>) {
        for (i, x) in v.to_array().into_iter().enumerate() {
            self.f32(off + i * 4, x);
        }
    }
}
