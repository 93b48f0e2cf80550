//! # Disk and sensor equipment definitions

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Bus address of a rotary disk or motor.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone, PartialOrd, Ord)]
pub struct DiskId(pub u8);

/// Bus address of a non-motor module, such as a load sensor.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone, PartialOrd, Ord)]
pub struct ModuleId(pub u8);

/// Latest telemetry sample of a disk, as refreshed by the bus receive path.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq)]
pub struct DiskTelemetry {
    /// Present position of the disk in the disk's raw frame.
    ///
    /// Units: degrees
    pub present_position: f64,

    /// Present rotation speed of the disk.
    ///
    /// Units: degrees/second
    pub rot_speed: f64,
}

/// Controller gains pushed to a disk at construction.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands which can be written to a disk.
///
/// A command being accepted by the bus does not mean it has been physically applied.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum DiskCmd {
    /// Target position of a speed-limited position controller (Orbita disks).
    ///
    /// Units: degrees
    TargetRotPosition(f64),

    /// Speed limit used when reaching `TargetRotPosition`.
    ///
    /// Units: degrees/second
    TargetRotSpeed(f64),

    /// Goal position of a servo motor.
    ///
    /// Units: degrees
    GoalPosition(f64),

    /// Enable (`true`) or disable (`false`) compliance. A compliant disk applies no holding
    /// torque.
    Compliant(bool),

    /// Define the current raw reading as zero.
    SetToZero,

    /// Set the disk position controller gains.
    Pid(PidGains),

    /// Set the disk drive train description.
    DriveTrain {
        reduction: f64,
        wheel_size_mm: f64,
        encoder_res: u32,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk#{}", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}
