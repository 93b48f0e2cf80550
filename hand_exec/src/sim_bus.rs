//! # Simulated bus
//!
//! In-process [`Bus`] used for simulation runs of the executable and by the tests. Disks follow
//! simple first-order dynamics which are integrated lazily each time the bus is accessed:
//!
//! - a disk moves toward its last commanded position (goal or target position) at its speed
//!   limit, or instantly if it has none,
//! - motion is clamped by the disk's hard stops, where the reported speed drops to zero,
//! - compliant disks don't move,
//! - `SetToZero` re-references the raw position and holds the disk where it is,
//! - disks built with wrapped readings report their raw position modulo one turn, as an encoder
//!   which doesn't count turns would.
//!
//! Load sensors report a raw value computed from the present position of a source disk.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::Instant,
};

use comms_if::{
    bus::{Bus, BusError},
    eqpt::{DiskCmd, DiskId, DiskTelemetry, ModuleId},
};
use util::maths;

use crate::{
    hand::params::{ForceGripperParams, HandParams, OrbitaWristParams},
    orbita::RAW_PERIOD,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Bus address given to the simulated gripper load sensor.
pub const SIM_SENSOR_ID: ModuleId = ModuleId(40);

/// Position of the simulated gripper at which the object is touched.
///
/// Units: degrees
const SIM_CONTACT_POS: f64 = 5.0;

/// Force gained per degree of squeeze past the contact position.
const SIM_STIFFNESS: f64 = 20.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Description of a simulated disk.
#[derive(Debug, Clone, Copy)]
pub struct SimDisk {
    /// Initial absolute position.
    pub position: f64,

    /// Lower hard stop, absolute.
    pub min_stop: f64,

    /// Upper hard stop, absolute.
    pub max_stop: f64,

    /// Default speed limit, `None` for a disk which reaches its setpoint instantly.
    ///
    /// Units: degrees/second
    pub max_speed: Option<f64>,

    /// Initial compliance.
    pub compliant: bool,

    /// Report the raw position wrapped into `[0, 360)`.
    pub wrapped: bool,
}

pub struct SimBus {
    state: Mutex<SimState>,
}

struct SimState {
    connected: bool,

    last_update: Instant,

    disks: BTreeMap<DiskId, DiskState>,

    sensors: Vec<SimSensor>,

    /// Every command accepted, in order.
    log: Vec<(DiskId, DiskCmd)>,
}

struct DiskState {
    sim: SimDisk,

    /// Absolute position of the raw zero.
    zero: f64,

    /// Absolute setpoint.
    setpoint: f64,

    /// Speed limit set through `TargetRotSpeed`.
    speed_limit: Option<f64>,

    compliant: bool,

    speed: f64,
}

struct SimSensor {
    name: String,
    id: ModuleId,
    source: DiskId,
    raw: Box<dyn Fn(f64) -> f64 + Send + Sync>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDisk {
    /// A servo which reaches its goal instantly and has no hard stops.
    pub fn servo(position: f64) -> Self {
        Self {
            position,
            min_stop: std::f64::NEG_INFINITY,
            max_stop: std::f64::INFINITY,
            max_speed: None,
            compliant: false,
            wrapped: false,
        }
    }

    /// A compliant Orbita disk, whose speed is set by the `TargetRotSpeed` command.
    pub fn orbita(position: f64) -> Self {
        Self {
            compliant: true,
            ..Self::servo(position)
        }
    }

    pub fn with_stops(self, min_stop: f64, max_stop: f64) -> Self {
        Self {
            min_stop,
            max_stop,
            ..self
        }
    }

    pub fn with_max_speed(self, max_speed: f64) -> Self {
        Self {
            max_speed: Some(max_speed),
            ..self
        }
    }

    pub fn with_wrapped_readings(self) -> Self {
        Self {
            wrapped: true,
            ..self
        }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: true,
                last_update: Instant::now(),
                disks: BTreeMap::new(),
                sensors: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    /// Build a simulation matching the given hand parameters.
    pub fn for_hand(params: &HandParams) -> Self {
        match params {
            HandParams::ForceGripper(p) => Self::force_gripper(p),
            HandParams::OrbitaWrist(p) => Self::orbita_wrist(p),
        }
    }

    /// Force gripper whose gripper starts open and touches an object at `SIM_CONTACT_POS`.
    pub fn force_gripper(params: &ForceGripperParams) -> Self {
        let mut bus = Self::new();

        for motor in params.motors.iter() {
            let start = if motor.name == params.gripper {
                motor.to_raw(params.grip.open_end_pos)
            } else {
                motor.to_raw(0.0)
            };
            bus = bus.with_disk(motor.id, SimDisk::servo(start).with_max_speed(400.0));
        }

        if let Some(gripper) = params.motors.iter().find(|m| m.name == params.gripper) {
            let gripper = gripper.clone();
            let (offset, scale) = (params.sensor_offset, params.sensor_scale);

            bus = bus.with_load_sensor(&params.sensor_name, SIM_SENSOR_ID, gripper.id, move |raw| {
                let squeeze = (gripper.to_logical(raw) - SIM_CONTACT_POS).max(0.0);
                offset + SIM_STIFFNESS * squeeze / scale
            });
        }

        bus
    }

    /// Orbita wrist whose disks power up at arbitrary positions, 60 to 180 degrees away from
    /// their lower hard stop.
    pub fn orbita_wrist(params: &OrbitaWristParams) -> Self {
        let mut bus = Self::new();

        for (i, id) in params.disk_ids.iter().enumerate() {
            let start = 40.0 + 37.0 * i as f64;
            let stop = -20.0 - 23.0 * i as f64;
            bus = bus.with_disk(*id, SimDisk::orbita(start).with_stops(stop, std::f64::INFINITY));
        }

        bus
    }

    pub fn with_disk(self, id: DiskId, sim: SimDisk) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.disks.insert(
                id,
                DiskState {
                    sim,
                    zero: 0.0,
                    setpoint: sim.position,
                    speed_limit: None,
                    compliant: sim.compliant,
                    speed: 0.0,
                },
            );
        }
        self
    }

    /// Add a load sensor whose raw value is `raw(position)`, `position` being the raw present
    /// position of `source`.
    pub fn with_load_sensor<F>(self, name: &str, id: ModuleId, source: DiskId, raw: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        if let Ok(mut state) = self.state.lock() {
            state.sensors.push(SimSensor {
                name: name.into(),
                id,
                source,
                raw: Box::new(raw),
            });
        }
        self
    }

    /// Simulate the link going down (`false`) or coming back (`true`).
    pub fn set_connected(&self, connected: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.connected = connected;
        }
    }

    /// Continuous raw position of a disk, never wrapped.
    pub fn raw_position(&self, id: DiskId) -> Option<f64> {
        let mut state = self.state.lock().ok()?;
        state.advance();
        state.disks.get(&id).map(|d| d.sim.position - d.zero)
    }

    /// Absolute position of a disk, unaffected by `SetToZero`.
    pub fn abs_position(&self, id: DiskId) -> Option<f64> {
        let mut state = self.state.lock().ok()?;
        state.advance();
        state.disks.get(&id).map(|d| d.sim.position)
    }

    pub fn is_compliant(&self, id: DiskId) -> Option<bool> {
        let state = self.state.lock().ok()?;
        state.disks.get(&id).map(|d| d.compliant)
    }

    /// Commands accepted for one disk, in order.
    pub fn commands(&self, id: DiskId) -> Vec<DiskCmd> {
        match self.state.lock() {
            Ok(state) => state
                .log
                .iter()
                .filter(|(i, _)| *i == id)
                .map(|(_, c)| *c)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, BusError> {
        let mut state = self.state.lock().map_err(|_| BusError::Poisoned)?;

        if !state.connected {
            return Err(BusError::NotConnected);
        }
        state.advance();

        Ok(state)
    }
}

impl SimState {
    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        for disk in self.disks.values_mut() {
            if disk.compliant {
                disk.speed = 0.0;
                continue;
            }

            let error = disk.setpoint - disk.sim.position;
            let unclamped = match disk.speed_limit.or(disk.sim.max_speed) {
                Some(v) => disk.sim.position + maths::clamp(error, -v * dt, v * dt),
                None => disk.setpoint,
            };
            let next = maths::clamp(unclamped, disk.sim.min_stop, disk.sim.max_stop);

            if dt > 0.0 {
                disk.speed = (next - disk.sim.position) / dt;
            }
            disk.sim.position = next;
        }
    }

    fn disk(&mut self, id: DiskId) -> Result<&mut DiskState, BusError> {
        self.disks.get_mut(&id).ok_or(BusError::UnknownDisk(id))
    }
}

impl Bus for SimBus {
    fn send(&self, id: DiskId, cmd: DiskCmd) -> Result<(), BusError> {
        let mut state = self.lock()?;
        let disk = state.disk(id)?;

        match cmd {
            DiskCmd::TargetRotPosition(p) | DiskCmd::GoalPosition(p) => disk.setpoint = p + disk.zero,
            DiskCmd::TargetRotSpeed(s) => disk.speed_limit = Some(s.abs()),
            DiskCmd::Compliant(c) => disk.compliant = c,
            DiskCmd::SetToZero => {
                disk.zero = disk.sim.position;
                disk.setpoint = disk.sim.position;
            }
            DiskCmd::Pid(_) | DiskCmd::DriveTrain { .. } => (),
        }

        state.log.push((id, cmd));
        Ok(())
    }

    fn disk_telemetry(&self, id: DiskId) -> Result<DiskTelemetry, BusError> {
        let mut state = self.lock()?;
        let disk = state.disk(id)?;

        let raw = disk.sim.position - disk.zero;
        let present_position = if disk.sim.wrapped {
            maths::rem_euclid(raw, RAW_PERIOD)
        } else {
            raw
        };

        Ok(DiskTelemetry {
            present_position,
            rot_speed: disk.speed,
        })
    }

    fn sensor_raw(&self, id: ModuleId) -> Result<f64, BusError> {
        let mut state = self.lock()?;

        let (source, index) = state
            .sensors
            .iter()
            .enumerate()
            .find(|(_, s)| s.id == id)
            .map(|(i, s)| (s.source, i))
            .ok_or(BusError::UnknownSensor(id))?;

        let position = {
            let disk = state.disk(source)?;
            disk.sim.position - disk.zero
        };

        Ok((state.sensors[index].raw)(position))
    }

    fn find_disk(&self, id: DiskId) -> Result<(), BusError> {
        let mut state = self.lock()?;
        state.disk(id).map(|_| ())
    }

    fn find_module(&self, name: &str) -> Result<ModuleId, BusError> {
        let state = self.lock()?;

        state
            .sensors
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| BusError::UnknownModule(name.into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn test_disk_stalls_on_stop() {
        let bus = SimBus::new()
            .with_disk(DiskId(1), SimDisk::orbita(0.0).with_stops(-10.0, 10.0));

        bus.send(DiskId(1), DiskCmd::Compliant(false)).unwrap();
        bus.send(DiskId(1), DiskCmd::TargetRotSpeed(1000.0)).unwrap();
        bus.send(DiskId(1), DiskCmd::TargetRotPosition(-270.0)).unwrap();

        thread::sleep(Duration::from_millis(50));
        bus.disk_telemetry(DiskId(1)).unwrap();
        thread::sleep(Duration::from_millis(5));

        let t = bus.disk_telemetry(DiskId(1)).unwrap();
        assert_eq!(t.present_position, -10.0);
        assert_eq!(t.rot_speed, 0.0);

        // Re-referencing holds the disk at the stop
        bus.send(DiskId(1), DiskCmd::SetToZero).unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(bus.raw_position(DiskId(1)), Some(0.0));
        assert_eq!(bus.abs_position(DiskId(1)), Some(-10.0));
    }

    #[test]
    fn test_compliant_disk_holds() {
        let bus = SimBus::new().with_disk(DiskId(1), SimDisk::orbita(3.0));

        bus.send(DiskId(1), DiskCmd::TargetRotPosition(50.0)).unwrap();
        thread::sleep(Duration::from_millis(5));

        assert_eq!(bus.raw_position(DiskId(1)), Some(3.0));
        assert_eq!(bus.is_compliant(DiskId(1)), Some(true));
    }

    #[test]
    fn test_wrapped_readings() {
        let bus = SimBus::new().with_disk(DiskId(1), SimDisk::servo(0.0).with_wrapped_readings());

        bus.send(DiskId(1), DiskCmd::GoalPosition(1000.0)).unwrap();
        assert_eq!(bus.disk_telemetry(DiskId(1)).unwrap().present_position, 280.0);
        assert_eq!(bus.raw_position(DiskId(1)), Some(1000.0));

        bus.send(DiskId(1), DiskCmd::GoalPosition(-10.0)).unwrap();
        assert_eq!(bus.disk_telemetry(DiskId(1)).unwrap().present_position, 350.0);
    }

    #[test]
    fn test_disconnected() {
        let bus = SimBus::new().with_disk(DiskId(1), SimDisk::servo(0.0));
        bus.set_connected(false);

        assert!(matches!(
            bus.send(DiskId(1), DiskCmd::SetToZero),
            Err(BusError::NotConnected)
        ));
        assert!(bus.commands(DiskId(1)).is_empty());
    }
}
