//! # Wrist kinematics model
//!
//! Maps between the orientation of the Orbita platform and the angles of its three disks.
//!
//! The platform carries three arm attachment points, `R` away from its center and spread 120
//! degrees apart. Each disk drives one arm around the vertical axis of the coupling point, so the
//! angle of a disk is the azimuth of its attachment point as seen from the coupling point,
//! relative to the azimuth that point has when the platform is level (identity orientation).
//!
//! In the platform frame attachment point `i` is at
//!
//! ```text
//! b_i = (Pc - Cp) + R * [cos(2 pi i / 3), sin(2 pi i / 3), 0]
//! ```
//!
//! and for an orientation `Q` it is at `p_i = Q * R0 * b_i`, giving the disk angle
//! `phi_i = atan2(p_i.y, p_i.x) - rest_i`.
//!
//! Disk angles are in radians, raw motor angles in degrees. A raw angle is the disk angle times
//! the reduction ratio, which means the raw encoder wraps many times for a single turn of the
//! platform. The model keeps two separate histories: the last commanded angles, which keep the
//! inverse continuous, and the last unwrapped readings, which resolve the turns of the next
//! reading. Readings only unwrap correctly if they are sampled at least once every half raw turn
//! of travel. Both histories must be cleared with [`WristKinematicsModel::reset_last_angles`]
//! whenever the disks are re-zeroed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use thiserror::Error;
use util::maths;

use super::params::OrbitaConfig;
use crate::params::ParamsError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of disks of an Orbita actuator.
pub const NUM_DISKS: usize = 3;

/// One turn of the raw motor shaft.
///
/// Units: degrees
pub const RAW_PERIOD: f64 = 360.0;

/// Attachment points closer to the vertical axis than this are singular.
///
/// Units: millimeters
const SINGULAR_RADIUS: f64 = 1e-6;

/// Step used for the numerical jacobian of the forward solver.
const JACOBIAN_STEP: f64 = 1e-7;

/// Largest rotation applied by one solver iteration.
///
/// Units: radians
const MAX_SOLVER_STEP: f64 = 0.5;

const MAX_SOLVER_ITERS: usize = 50;

/// Residual below which the forward solver has converged.
///
/// Units: radians
const SOLVER_TOL: f64 = 1e-12;

/// Residual above which a solution is rejected once the iterations are exhausted.
///
/// Units: radians
const SOLVER_ACCEPT_TOL: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Stateful kinematics model of one Orbita wrist.
#[derive(Debug, Clone)]
pub struct WristKinematicsModel {
    config: OrbitaConfig,

    r0: UnitQuaternion<f64>,

    /// Attachment points in the platform frame.
    attach: [Vector3<f64>; NUM_DISKS],

    /// Azimuth of each attachment point at identity orientation.
    rest_azimuth: [f64; NUM_DISKS],

    /// Last continuous disk angles produced by the inverse kinematics.
    last_angles: Option<[f64; NUM_DISKS]>,

    /// Last unwrapped raw readings. Commands never touch this.
    last_sample: Option<[f64; NUM_DISKS]>,

    /// Last orientation recovered by the forward kinematics, seeds the next solve.
    last_orientation: Option<UnitQuaternion<f64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum KinematicsError {
    #[error("Invalid Orbita parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Attachment point of disk {0} is on the vertical axis")]
    Singular(usize),

    #[error("Raw angle of disk {0} is not finite")]
    InvalidReading(usize),

    #[error("Orientation solver did not converge (residual {0:.3e} rad)")]
    NoConvergence(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WristKinematicsModel {
    pub fn new(config: OrbitaConfig) -> Result<Self, KinematicsError> {
        config.are_valid()?;

        let r0 = config.r0_quaternion();
        let lever = config.lever();

        let mut attach = [Vector3::zeros(); NUM_DISKS];
        let mut rest_azimuth = [0.0; NUM_DISKS];

        for i in 0..NUM_DISKS {
            let theta = std::f64::consts::TAU * i as f64 / NUM_DISKS as f64;
            attach[i] = lever + config.r * Vector3::new(theta.cos(), theta.sin(), 0.0);
            rest_azimuth[i] = azimuth(&(r0 * attach[i])).ok_or(KinematicsError::Singular(i))?;
        }

        Ok(Self {
            config,
            r0,
            attach,
            rest_azimuth,
            last_angles: None,
            last_sample: None,
            last_orientation: None,
        })
    }

    pub fn config(&self) -> &OrbitaConfig {
        &self.config
    }

    /// Forget the angle history.
    ///
    /// Must be called whenever the zero of the disks is redefined.
    pub fn reset_last_angles(&mut self) {
        trace!("Kinematics angle history reset");
        self.last_angles = None;
        self.last_sample = None;
        self.last_orientation = None;
    }

    /// Disk angles of an orientation, each wrapped into `(-pi, pi]`.
    ///
    /// This is pure geometry and does not use or update the angle history.
    pub fn disk_angles(
        &self,
        orientation: &UnitQuaternion<f64>,
    ) -> Result<[f64; NUM_DISKS], KinematicsError> {
        let mut angles = [0.0; NUM_DISKS];

        for i in 0..NUM_DISKS {
            let az = azimuth(&(orientation * self.r0 * self.attach[i]))
                .ok_or(KinematicsError::Singular(i))?;
            angles[i] = maths::wrap_pi(az - self.rest_azimuth[i]);
        }

        Ok(angles)
    }

    /// Raw motor targets for an orientation.
    ///
    /// Disk angles are made continuous with the previous call so a disk never takes the long way
    /// round. The readback history is left alone, a disk may be anywhere between its last reading
    /// and the new target when it is next sampled.
    ///
    /// Units: degrees
    pub fn inverse(
        &mut self,
        orientation: &UnitQuaternion<f64>,
    ) -> Result<[f64; NUM_DISKS], KinematicsError> {
        let mut angles = self.disk_angles(orientation)?;

        if let Some(last) = self.last_angles {
            for i in 0..NUM_DISKS {
                angles[i] = maths::unwrap_nearest(angles[i], last[i], std::f64::consts::TAU);
            }
        }

        let mut raw = [0.0; NUM_DISKS];
        for i in 0..NUM_DISKS {
            raw[i] = angles[i].to_degrees() * self.config.reduction;
        }

        self.last_angles = Some(angles);

        Ok(raw)
    }

    /// Unwrap raw readings against the previous readings, then record them as the new history.
    ///
    /// The first reading after a reset is taken as is.
    pub fn unwrap(&mut self, raw: [f64; NUM_DISKS]) -> Result<[f64; NUM_DISKS], KinematicsError> {
        if let Some(i) = raw.iter().position(|r| !r.is_finite()) {
            return Err(KinematicsError::InvalidReading(i));
        }

        let unwrapped = match self.last_sample {
            Some(last) => {
                let mut u = [0.0; NUM_DISKS];
                for i in 0..NUM_DISKS {
                    u[i] = maths::unwrap_nearest(raw[i], last[i], RAW_PERIOD);
                }
                u
            }
            None => raw,
        };

        self.last_sample = Some(unwrapped);

        Ok(unwrapped)
    }

    /// Recover the platform orientation from raw readings.
    pub fn forward(
        &mut self,
        raw: [f64; NUM_DISKS],
    ) -> Result<UnitQuaternion<f64>, KinematicsError> {
        let unwrapped = self.unwrap(raw)?;

        let mut angles = [0.0; NUM_DISKS];
        for i in 0..NUM_DISKS {
            angles[i] = (unwrapped[i] / self.config.reduction).to_radians();
        }

        let q = self.solve(&angles)?;
        self.last_orientation = Some(q);

        Ok(q)
    }

    /// Gauss-Newton solve of the orientation giving the target disk angles.
    fn solve(&self, angles: &[f64; NUM_DISKS]) -> Result<UnitQuaternion<f64>, KinematicsError> {
        let mut q = match self.last_orientation {
            Some(q) => q,
            None => {
                // Circular mean, the angles may straddle the wrap
                let (s, c) = angles
                    .iter()
                    .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), s.atan2(c))
            }
        };

        let mut r = self.residual(&q, angles)?;

        for iter in 0..MAX_SOLVER_ITERS {
            if r.amax() < SOLVER_TOL {
                trace!("Orientation solved in {} iterations", iter);
                return Ok(q);
            }

            let mut jac = Matrix3::zeros();
            for j in 0..3 {
                let mut delta = Vector3::zeros();
                delta[j] = JACOBIAN_STEP;
                let rj = self.residual(&(UnitQuaternion::from_scaled_axis(delta) * q), angles)?;

                for i in 0..NUM_DISKS {
                    jac[(i, j)] = maths::wrap_pi(rj[i] - r[i]) / JACOBIAN_STEP;
                }
            }

            let jac_inv = match jac.try_inverse() {
                Some(j) => j,
                None => return Err(KinematicsError::NoConvergence(r.amax())),
            };

            let mut step = -(jac_inv * r);
            let norm = step.norm();
            if norm > MAX_SOLVER_STEP {
                step *= MAX_SOLVER_STEP / norm;
            }

            q = UnitQuaternion::from_scaled_axis(step) * q;
            r = self.residual(&q, angles)?;
        }

        if r.amax() < SOLVER_ACCEPT_TOL {
            Ok(q)
        } else {
            Err(KinematicsError::NoConvergence(r.amax()))
        }
    }

    fn residual(
        &self,
        q: &UnitQuaternion<f64>,
        angles: &[f64; NUM_DISKS],
    ) -> Result<Vector3<f64>, KinematicsError> {
        let current = self.disk_angles(q)?;

        Ok(Vector3::new(
            maths::wrap_pi(current[0] - angles[0]),
            maths::wrap_pi(current[1] - angles[1]),
            maths::wrap_pi(current[2] - angles[2]),
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Azimuth of a point around the vertical axis, `None` if it lies on the axis.
fn azimuth(p: &Vector3<f64>) -> Option<f64> {
    if p.x.hypot(p.y) < SINGULAR_RADIUS {
        None
    } else {
        Some(p.y.atan2(p.x))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn model() -> WristKinematicsModel {
        WristKinematicsModel::new(OrbitaConfig::default()).unwrap()
    }

    fn euler(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
    }

    #[test]
    fn test_identity() {
        let mut m = model();
        let raw = m.inverse(&UnitQuaternion::identity()).unwrap();

        for r in raw.iter() {
            assert!(r.abs() < 1e-9);
        }
    }

    #[test]
    fn test_pure_yaw() {
        let m = model();
        let angles = m.disk_angles(&euler(0.0, 0.0, 30.0)).unwrap();

        for a in angles.iter() {
            assert!((a - 30f64.to_radians()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_round_trip() {
        let orientations = [
            euler(0.0, 0.0, 0.0),
            euler(10.0, 0.0, 0.0),
            euler(0.0, -15.0, 0.0),
            euler(20.0, 10.0, 45.0),
            euler(-25.0, 15.0, -120.0),
            euler(5.0, -20.0, 170.0),
        ];

        for q in orientations.iter() {
            let mut m = model();
            let raw = m.inverse(q).unwrap();

            m.reset_last_angles();
            let back = m.forward(raw).unwrap();

            assert!(back.angle_to(q) < 1e-6, "{:?} came back as {:?}", q, back);
        }
    }

    #[test]
    fn test_forward_tracks_sequence() {
        let mut m = model();

        // Walk the yaw past a half turn, the solver seeds from the previous solution. Steps stay
        // under half a raw turn so every reading unwraps against the one before it.
        for step in 0..100 {
            let q = euler(10.0, -5.0, 2.0 * step as f64);
            let raw = m.inverse(&q).unwrap();
            let back = m.forward(raw).unwrap();

            assert!(back.angle_to(&q) < 1e-6);
        }
    }

    #[test]
    fn test_inverse_is_continuous() {
        let mut m = model();

        let a = m.inverse(&euler(0.0, 0.0, 170.0)).unwrap();
        let b = m.inverse(&euler(0.0, 0.0, -170.0)).unwrap();

        // 20 degrees of yaw forward, not 340 degrees back
        let reduction = m.config().reduction;
        for i in 0..NUM_DISKS {
            assert!((b[i] - a[i] - 20.0 * reduction).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unwrap_nearest_continuation() {
        let mut m = model();

        // Encoder readings wrapped into [0, 360), moving +100 degrees per sample
        let truth: Vec<f64> = (0..20).map(|k| 50.0 + 100.0 * k as f64).collect();

        for t in truth.iter() {
            let reading = maths::rem_euclid(*t, RAW_PERIOD);
            let u = m.unwrap([reading, reading, reading]).unwrap();

            for v in u.iter() {
                assert!((v - t).abs() < 1e-9, "{} unwrapped to {}", t, v);
            }
        }

        // And backwards
        for t in truth.iter().rev() {
            let reading = maths::rem_euclid(*t, RAW_PERIOD) - RAW_PERIOD;
            let u = m.unwrap([reading; NUM_DISKS]).unwrap();
            assert!((u[0] - t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_commands_do_not_pull_readings() {
        let mut m = model();
        let reduction = m.config().reduction;

        // Disks read at rest, then commanded twenty degrees of yaw away (many raw turns)
        m.forward([0.0; NUM_DISKS]).unwrap();
        m.inverse(&euler(0.0, 0.0, 20.0)).unwrap();

        // Sampled one degree into the travel, the reading stays where the disks are
        let early = euler(0.0, 0.0, 1.0);
        let raw = [reduction; NUM_DISKS];
        let back = m.forward(raw).unwrap();
        assert!(back.angle_to(&early) < 1e-6, "read back {:?}", back.euler_angles());

        // Tracked to the end of the travel in small steps
        for step in 2..=20 {
            let raw = [step as f64 * reduction; NUM_DISKS];
            m.forward(raw).unwrap();
        }
        let back = m.forward([20.0 * reduction; NUM_DISKS]).unwrap();
        assert!(back.angle_to(&euler(0.0, 0.0, 20.0)) < 1e-6);
    }

    #[test]
    fn test_reset_single_sample() {
        let mut m = model();

        m.unwrap([1000.0, -2000.0, 3000.0]).unwrap();
        m.unwrap([1100.0, -2100.0, 3100.0]).unwrap();

        m.reset_last_angles();
        let u = m.unwrap([10.0, 200.0, -300.0]).unwrap();

        assert_eq!(u, [10.0, 200.0, -300.0]);
    }

    #[test]
    fn test_stale_history_offsets() {
        let mut m = model();
        let q = euler(10.0, 5.0, 0.0);

        // History anchored a few raw turns away, as after a re-zero without a reset
        m.unwrap([3.0 * RAW_PERIOD, 3.0 * RAW_PERIOD, 3.0 * RAW_PERIOD]).unwrap();
        let mut fresh = model();
        let raw = fresh.inverse(&q).unwrap();

        let stale = m.forward(raw).unwrap();
        m.reset_last_angles();
        let good = m.forward(raw).unwrap();

        assert!(good.angle_to(&q) < 1e-6);
        assert!(stale.angle_to(&q) > 1e-3);
    }

    #[test]
    fn test_invalid_reading() {
        let mut m = model();
        assert!(matches!(
            m.forward([0.0, std::f64::NAN, 0.0]),
            Err(KinematicsError::InvalidReading(1))
        ));
    }

    #[test]
    fn test_singular_geometry() {
        let mut config = OrbitaConfig::default();
        config.r = 0.0;
        assert!(matches!(
            WristKinematicsModel::new(config),
            Err(KinematicsError::InvalidParams(_))
        ));

        // With a unit lever and radius a 45 degree tilt about y puts attachment point 0 on the
        // vertical axis
        let mut config = OrbitaConfig::default();
        config.r0 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        config.pc_z = [0.0, 0.0, 0.0];
        config.cp_z = [0.0, 0.0, -1.0];
        config.r = 1.0;
        let m = WristKinematicsModel::new(config).unwrap();

        let tilt = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -std::f64::consts::FRAC_PI_4);
        assert!(matches!(m.disk_angles(&tilt), Err(KinematicsError::Singular(0))));
    }
}
