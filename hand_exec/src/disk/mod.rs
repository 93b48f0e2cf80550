//! # Disk actuator module
//!
//! A [`DiskActuator`] wraps one physical rotary disk (an Orbita disk or a servo motor) on the
//! bus. Positions and speeds handled by this module are in the disk's logical frame: the raw bus
//! values with the disk's mounting `orientation` and `offset` applied.
//!
//! Telemetry getters return the most recent sample published by the bus. Setters are commands;
//! a successful call only means the bus accepted the command.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod motion;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{sync::Arc, time::Duration};

use comms_if::{
    bus::{BusError, SharedBus},
    eqpt::{DiskCmd, DiskId, DiskTelemetry},
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

pub use motion::{stop_all, Interpolation, Motion, INTERP_PERIOD};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Static description of a disk, from the parameter files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskConfig {
    /// Name of the disk within its hand, e.g. `"gripper"`.
    pub name: String,

    /// Bus address of the disk.
    pub id: DiskId,

    /// Mechanical offset between the raw and logical zero.
    ///
    /// Units: degrees
    #[serde(default)]
    pub offset: f64,

    /// Sign convention for motion direction.
    #[serde(default)]
    pub orientation: Orientation,

    /// Translation of the link driven by this disk relative to its parent.
    ///
    /// Units: meters
    #[serde(default, rename = "link-translation")]
    pub link_translation: [f64; 3],

    /// Axis of rotation of the link driven by this disk.
    #[serde(default, rename = "link-rotation")]
    pub link_rotation: [f64; 3],

    /// Which position channel the disk is driven through.
    #[serde(default)]
    pub kind: DiskKind,
}

/// Handle to one disk on the bus.
///
/// Cloning the handle is cheap and all clones address the same disk.
#[derive(Clone)]
pub struct DiskActuator {
    bus: SharedBus,
    config: Arc<DiskConfig>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Mounting direction of a disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Direct,
    Indirect,
}

/// Position channel used by a disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiskKind {
    /// Servo motor driven through `goal_position`.
    Servo,

    /// Orbita disk driven through `target_rot_position`.
    OrbitaDisk,
}

#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("Transport failure: {0}")]
    Transport(#[from] BusError),

    #[error("Invalid motion duration {0} s")]
    InvalidDuration(f64),

    #[error("Invalid target position {0}")]
    InvalidTarget(f64),

    #[error("The motion driver thread panicked")]
    DriverPanicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Direct
    }
}

impl Orientation {
    fn sign(self) -> f64 {
        match self {
            Orientation::Direct => 1.0,
            Orientation::Indirect => -1.0,
        }
    }
}

impl Default for DiskKind {
    fn default() -> Self {
        DiskKind::Servo
    }
}

impl DiskConfig {
    /// Convert a raw bus position into the logical frame.
    pub fn to_logical(&self, raw: f64) -> f64 {
        self.orientation.sign() * raw - self.offset
    }

    /// Convert a logical position into the raw bus frame.
    pub fn to_raw(&self, logical: f64) -> f64 {
        self.orientation.sign() * (logical + self.offset)
    }
}

impl DiskActuator {
    /// Attach to the disk described by `config` on the given bus.
    ///
    /// The disk must be present on the bus.
    pub fn attach(bus: SharedBus, config: DiskConfig) -> Result<Self, DiskError> {
        bus.find_disk(config.id)?;

        debug!(
            "Attached {} ({}, {:?}, offset {}, link {:?}/{:?})",
            config.name,
            config.id,
            config.orientation,
            config.offset,
            config.link_translation,
            config.link_rotation
        );

        Ok(Self {
            bus,
            config: Arc::new(config),
        })
    }

    pub fn id(&self) -> DiskId {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// Latest telemetry sample, in the logical frame.
    pub fn telemetry(&self) -> Result<DiskTelemetry, DiskError> {
        let raw = self.bus.disk_telemetry(self.config.id)?;

        Ok(DiskTelemetry {
            present_position: self.config.to_logical(raw.present_position),
            rot_speed: self.config.orientation.sign() * raw.rot_speed,
        })
    }

    /// Present position.
    ///
    /// Units: degrees
    pub fn present_position(&self) -> Result<f64, DiskError> {
        Ok(self.telemetry()?.present_position)
    }

    /// Present rotation speed.
    ///
    /// Units: degrees/second
    pub fn rot_speed(&self) -> Result<f64, DiskError> {
        Ok(self.telemetry()?.rot_speed)
    }

    /// Enable or disable compliance (no holding torque when compliant).
    pub fn set_compliant(&self, compliant: bool) -> Result<(), DiskError> {
        self.send(DiskCmd::Compliant(compliant))
    }

    /// Set the speed limit used to reach `target_rot_position`.
    ///
    /// This is a magnitude and is not affected by the disk orientation.
    pub fn set_target_rot_speed(&self, speed: f64) -> Result<(), DiskError> {
        self.send(DiskCmd::TargetRotSpeed(speed.abs()))
    }

    pub fn set_target_rot_position(&self, position: f64) -> Result<(), DiskError> {
        let raw = self.checked_raw(position)?;
        self.send(DiskCmd::TargetRotPosition(raw))
    }

    pub fn set_goal_position(&self, position: f64) -> Result<(), DiskError> {
        let raw = self.checked_raw(position)?;
        self.send(DiskCmd::GoalPosition(raw))
    }

    /// Command a position through the channel matching the disk kind.
    pub fn set_position(&self, position: f64) -> Result<(), DiskError> {
        match self.config.kind {
            DiskKind::Servo => self.set_goal_position(position),
            DiskKind::OrbitaDisk => self.set_target_rot_position(position),
        }
    }

    /// Define the current raw reading as zero.
    pub fn set_to_zero(&self) -> Result<(), DiskError> {
        self.send(DiskCmd::SetToZero)
    }

    /// Write a command to the disk.
    pub fn send(&self, cmd: DiskCmd) -> Result<(), DiskError> {
        trace!("{} <- {:?}", self.config.name, cmd);
        self.bus.send(self.config.id, cmd).map_err(DiskError::from)
    }

    /// Move to `target` following the given interpolation profile over `duration_s` seconds.
    ///
    /// The trajectory starts from the present position. If `wait` is true this call blocks until
    /// the trajectory has been fully issued and the returned motion is already finished,
    /// otherwise the motion runs in the background and can be cancelled with [`Motion::stop`].
    pub fn goto(
        &self,
        target: f64,
        duration_s: f64,
        interpolation: Interpolation,
        wait: bool,
    ) -> Result<Motion, DiskError> {
        let start = self.present_position()?;
        self.goto_from(start, target, duration_s, interpolation, wait)
    }

    /// Same as [`DiskActuator::goto`], starting the trajectory from a known position.
    ///
    /// Used when the present position read from the bus is wrapped and the continuous position
    /// has been recovered by the caller.
    pub fn goto_from(
        &self,
        start: f64,
        target: f64,
        duration_s: f64,
        interpolation: Interpolation,
        wait: bool,
    ) -> Result<Motion, DiskError> {
        if !duration_s.is_finite() || duration_s < 0.0 {
            return Err(DiskError::InvalidDuration(duration_s));
        }
        if !target.is_finite() {
            return Err(DiskError::InvalidTarget(target));
        }
        if !start.is_finite() {
            return Err(DiskError::InvalidTarget(start));
        }

        debug!(
            "{} goto {:.2} -> {:.2} in {:.2} s ({:?})",
            self.config.name, start, target, duration_s, interpolation
        );

        let mut motion = Motion::start(
            self.clone(),
            start,
            target,
            Duration::from_secs_f64(duration_s),
            interpolation,
        );

        if wait {
            motion.wait()?;
        }

        Ok(motion)
    }

    fn checked_raw(&self, position: f64) -> Result<f64, DiskError> {
        if position.is_finite() {
            Ok(self.config.to_raw(position))
        } else {
            Err(DiskError::InvalidTarget(position))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_bus::{SimBus, SimDisk};
    use std::sync::Arc;

    fn config(orientation: Orientation, offset: f64) -> DiskConfig {
        DiskConfig {
            name: "gripper".into(),
            id: DiskId(17),
            offset,
            orientation,
            link_translation: [0.0, -0.0185, -0.06],
            link_rotation: [0.0; 3],
            kind: DiskKind::Servo,
        }
    }

    #[test]
    fn test_frame_conversion() {
        let direct = config(Orientation::Direct, 5.0);
        assert_eq!(direct.to_raw(10.0), 15.0);
        assert_eq!(direct.to_logical(15.0), 10.0);

        let indirect = config(Orientation::Indirect, 5.0);
        assert_eq!(indirect.to_raw(10.0), -15.0);
        assert_eq!(indirect.to_logical(indirect.to_raw(-42.0)), -42.0);
    }

    #[test]
    fn test_attach_unknown_disk() {
        let bus = Arc::new(SimBus::new());

        match DiskActuator::attach(bus, config(Orientation::Direct, 0.0)) {
            Err(DiskError::Transport(BusError::UnknownDisk(DiskId(17)))) => (),
            Err(e) => panic!("Unexpected error {}", e),
            Ok(_) => panic!("Attached to a disk which isn't on the bus"),
        }
    }

    #[test]
    fn test_set_to_zero_idempotent() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(37.5)));
        let disk = DiskActuator::attach(bus, config(Orientation::Direct, 0.0)).unwrap();

        assert_eq!(disk.present_position().unwrap(), 37.5);

        disk.set_to_zero().unwrap();
        let first = disk.present_position().unwrap();
        disk.set_to_zero().unwrap();
        let second = disk.present_position().unwrap();

        assert_eq!(first, 0.0);
        assert_eq!(second, first);
    }

    #[test]
    fn test_goto_rejects_bad_arguments() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(0.0)));
        let disk = DiskActuator::attach(bus, config(Orientation::Direct, 0.0)).unwrap();

        assert!(matches!(
            disk.goto(10.0, -1.0, Interpolation::MinJerk, true),
            Err(DiskError::InvalidDuration(_))
        ));
        assert!(matches!(
            disk.goto(std::f64::NAN, 1.0, Interpolation::MinJerk, true),
            Err(DiskError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_goto_from_known_start() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(700.0)));
        let disk = DiskActuator::attach(bus.clone(), config(Orientation::Direct, 0.0)).unwrap();

        disk.goto_from(700.0, 720.0, 0.05, Interpolation::Linear, true).unwrap();

        // Every tick lies between the given start and the target
        for cmd in bus.commands(DiskId(17)) {
            match cmd {
                DiskCmd::GoalPosition(p) => assert!(p >= 700.0 - 1e-9 && p <= 720.0 + 1e-9),
                c => panic!("Unexpected command {:?}", c),
            }
        }
        assert!((disk.present_position().unwrap() - 720.0).abs() < 1e-9);
    }

    #[test]
    fn test_indirect_goto_blocking() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(0.0)));
        let disk = DiskActuator::attach(bus.clone(), config(Orientation::Indirect, 0.0)).unwrap();

        let motion = disk.goto(20.0, 0.05, Interpolation::Linear, true).unwrap();
        assert!(motion.is_finished());

        assert!((disk.present_position().unwrap() - 20.0).abs() < 1e-9);
        assert!((bus.raw_position(DiskId(17)).unwrap() + 20.0).abs() < 1e-9);
    }
}
