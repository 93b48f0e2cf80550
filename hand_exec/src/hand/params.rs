//! # Hand parameters
//!
//! Each hand variant has its own parameter file, tagged with the hand `kind`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::DiskId;
use serde::Deserialize;

use crate::{
    disk::{DiskConfig, DiskKind, Orientation},
    grip::GripParams,
    homing::HomingParams,
    orbita::{OrbitaConfig, NUM_DISKS},
    params::{check_finite, check_positive, ParamsError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of a force gripper hand: two wrist motors, the gripper and its load sensor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForceGripperParams {
    pub name: String,

    /// Motor table.
    pub motors: Vec<DiskConfig>,

    /// Name of the gripper motor in the motor table.
    pub gripper: String,

    /// Name of the load sensor module on the bus.
    pub sensor_name: String,

    /// Load sensor raw counts at zero force.
    pub sensor_offset: f64,

    /// Load sensor counts-to-force factor.
    pub sensor_scale: f64,

    pub grip: GripParams,
}

/// Parameters of an Orbita wrist hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrbitaWristParams {
    pub name: String,

    /// Bus addresses of the top, middle and bottom disks.
    pub disk_ids: [DiskId; NUM_DISKS],

    pub orbita: OrbitaConfig,

    pub homing: HomingParams,

    /// Duration of the motion performed by an orient command.
    ///
    /// Units: seconds
    pub orient_duration_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Parameters of one hand, tagged by its kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandParams {
    ForceGripper(ForceGripperParams),
    OrbitaWrist(OrbitaWristParams),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HandParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        match self {
            HandParams::ForceGripper(p) => p.are_valid(),
            HandParams::OrbitaWrist(p) => p.are_valid(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HandParams::ForceGripper(p) => &p.name,
            HandParams::OrbitaWrist(p) => &p.name,
        }
    }
}

impl Default for ForceGripperParams {
    fn default() -> Self {
        let motor = |name: &str, id, orientation, link_translation, link_rotation| DiskConfig {
            name: name.into(),
            id: DiskId(id),
            offset: 0.0,
            orientation,
            link_translation,
            link_rotation,
            kind: DiskKind::Servo,
        };

        Self {
            name: "hand".into(),
            motors: vec![
                motor(
                    "wrist_pitch",
                    15,
                    Orientation::Indirect,
                    [0.0, 0.0, -0.22425],
                    [0.0, 1.0, 0.0],
                ),
                motor(
                    "wrist_roll",
                    16,
                    Orientation::Indirect,
                    [0.0, 0.0, -0.03243],
                    [1.0, 0.0, 0.0],
                ),
                motor(
                    "gripper",
                    17,
                    Orientation::Direct,
                    [0.0, -0.0185, -0.06],
                    [0.0, 0.0, 0.0],
                ),
            ],
            gripper: "gripper".into(),
            sensor_name: "force_gripper".into(),
            sensor_offset: 4.0,
            sensor_scale: 10000.0,
            grip: GripParams::default(),
        }
    }
}

impl ForceGripperParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let ids: Vec<DiskId> = self.motors.iter().map(|m| m.id).collect();
        if ids.iter().any(|id| ids.iter().filter(|i| *i == id).count() > 1) {
            return Err(ParamsError::NonUniqueDiskIds);
        }

        for m in self.motors.iter() {
            check_finite("motor offset", m.offset)?;
        }

        if !self.motors.iter().any(|m| m.name == self.gripper) {
            return Err(ParamsError::MissingMotor(self.gripper.clone()));
        }

        check_finite("sensor_offset", self.sensor_offset)?;
        if self.sensor_scale == 0.0 || !self.sensor_scale.is_finite() {
            return Err(ParamsError::NotPositive("|sensor_scale|", self.sensor_scale));
        }

        self.grip.are_valid()
    }

    /// Configuration of the gripper motor.
    pub fn gripper_config(&self) -> Option<&DiskConfig> {
        self.motors.iter().find(|m| m.name == self.gripper)
    }
}

impl Default for OrbitaWristParams {
    fn default() -> Self {
        Self {
            name: "wrist".into(),
            disk_ids: [DiskId(10), DiskId(11), DiskId(12)],
            orbita: OrbitaConfig::default(),
            homing: HomingParams::default(),
            orient_duration_s: 1.0,
        }
    }
}

impl OrbitaWristParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        let ids = &self.disk_ids;
        if ids[0] == ids[1] || ids[1] == ids[2] || ids[0] == ids[2] {
            return Err(ParamsError::NonUniqueDiskIds);
        }

        self.orbita.are_valid()?;
        self.homing.are_valid()?;
        check_positive("orient_duration_s", self.orient_duration_s)
    }
}
