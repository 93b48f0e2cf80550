//! # Orbita geometric constants

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::params::{check_finite, check_positive, ParamsError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tolerance used when checking that `R0` is a rotation.
const ROTATION_TOL: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Mechanical description of an Orbita parallel wrist.
///
/// Lengths are in millimeters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrbitaConfig {
    /// Position of the platform center.
    #[serde(rename = "Pc_z")]
    pub pc_z: [f64; 3],

    /// Position of the coupling point (center of rotation).
    #[serde(rename = "Cp_z")]
    pub cp_z: [f64; 3],

    /// Radius of the circle the disk arms attach to on the platform.
    #[serde(rename = "R")]
    pub r: f64,

    /// Fixed rotation aligning the disk layout to the platform frame, row-major.
    #[serde(rename = "R0")]
    pub r0: [[f64; 3]; 3],

    /// Gains of the disk position loops, `[P, I, D]`.
    pub pid: [f64; 3],

    /// Motor shaft turns per disk turn.
    pub reduction: f64,

    /// Diameter of the disk wheel.
    pub wheel_size: f64,

    /// Encoder resolution.
    pub encoder_res: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for OrbitaConfig {
    fn default() -> Self {
        let r0 = Rotation3::from_axis_angle(&Vector3::z_axis(), 60f64.to_radians());
        let m = r0.matrix();

        Self {
            pc_z: [0.0, 0.0, 25.0],
            cp_z: [0.0, 0.0, 0.0],
            r: 36.7,
            r0: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            pid: [10.0, 0.04, 90.0],
            reduction: 77.35,
            wheel_size: 62.0,
            encoder_res: 3,
        }
    }
}

impl OrbitaConfig {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        check_positive("R", self.r)?;
        check_positive("reduction", self.reduction)?;
        check_positive("wheel_size", self.wheel_size)?;

        for v in self.pc_z.iter().chain(self.cp_z.iter()).chain(self.pid.iter()) {
            check_finite("Pc_z/Cp_z/pid", *v)?;
        }

        let m = self.r0_matrix();
        if m.iter().any(|v| !v.is_finite())
            || (m * m.transpose() - Matrix3::identity()).amax() > ROTATION_TOL
            || (m.determinant() - 1.0).abs() > ROTATION_TOL
        {
            return Err(ParamsError::ImproperRotation);
        }

        if self.lever().norm() < ROTATION_TOL {
            return Err(ParamsError::DegenerateGeometry);
        }

        Ok(())
    }

    /// `R0` as a matrix.
    pub fn r0_matrix(&self) -> Matrix3<f64> {
        let r = &self.r0;
        Matrix3::new(
            r[0][0], r[0][1], r[0][2],
            r[1][0], r[1][1], r[1][2],
            r[2][0], r[2][1], r[2][2],
        )
    }

    /// `R0` as a unit quaternion. Only meaningful for valid parameters.
    pub fn r0_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.r0_matrix()))
    }

    /// Vector from the coupling point to the platform center.
    pub fn lever(&self) -> Vector3<f64> {
        Vector3::from(self.pc_z) - Vector3::from(self.cp_z)
    }
}
