//! # Hand variants
//!
//! A hand is one of a closed set of variants, each owning its own disks and parameters. Hands
//! are driven through the [`Capabilities`] interface; a variant only implements the
//! capabilities it physically has, the others report [`HandError::Unsupported`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod force_gripper;
mod orbita_wrist;
pub mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    bus::SharedBus,
    tc::{HandCmd, HandResponse},
};
use log::{debug, info};
use nalgebra::{Quaternion, UnitQuaternion};
use thiserror::Error;
use util::cancel::CancelToken;

use crate::{
    disk::DiskError,
    grip::{GripError, GripOutcome},
    homing::{HomingError, HomingReport},
    load_sensor::SensorError,
    orbita::OrbitaError,
    params::ParamsError,
};

pub use force_gripper::ForceGripper;
pub use orbita_wrist::OrbitaWrist;
pub use params::{ForceGripperParams, HandParams, OrbitaWristParams};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Quaternions with a smaller norm can't be normalised into an orientation.
const MIN_QUATERNION_NORM: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Operations a hand may support.
pub trait Capabilities {
    fn name(&self) -> &str;

    /// Name of the hand variant.
    fn kind(&self) -> &'static str;

    /// Open the gripper, unset arguments use the hand's defaults.
    fn open(&mut self, _end_pos: Option<f64>, _duration_s: Option<f64>) -> Result<(), HandError> {
        Err(self.unsupported("open"))
    }

    /// Close the gripper, unset arguments use the hand's defaults.
    fn close(
        &mut self,
        _end_pos: Option<f64>,
        _duration_s: Option<f64>,
        _target_force: Option<f64>,
        _cancel: &CancelToken,
    ) -> Result<GripOutcome, HandError> {
        Err(self.unsupported("close"))
    }

    fn grip_force(&mut self) -> Result<f64, HandError> {
        Err(self.unsupported("grip_force"))
    }

    /// Run the calibration sequence.
    fn home(&mut self, _cancel: &CancelToken) -> Result<HomingReport, HandError> {
        Err(self.unsupported("home"))
    }

    /// Start moving to an orientation, without waiting for it to be reached.
    fn orient(&mut self, _orientation: &UnitQuaternion<f64>) -> Result<(), HandError> {
        Err(self.unsupported("orient"))
    }

    fn orientation(&mut self) -> Result<UnitQuaternion<f64>, HandError> {
        Err(self.unsupported("orientation"))
    }

    fn unsupported(&self, capability: &'static str) -> HandError {
        HandError::Unsupported {
            hand: self.name().to_string(),
            kind: self.kind(),
            capability,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A hand of any kind.
pub enum Hand {
    ForceGripper(ForceGripper),
    OrbitaWrist(OrbitaWrist),
}

#[derive(Debug, Error)]
pub enum HandError {
    #[error("Invalid hand parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("No motor named {0}")]
    MissingMotor(String),

    #[error("{hand} ({kind}) does not support {capability}")]
    Unsupported {
        hand: String,
        kind: &'static str,
        capability: &'static str,
    },

    #[error("Invalid orientation quaternion {0:?}")]
    InvalidOrientation([f64; 4]),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Orbita(#[from] OrbitaError),

    #[error(transparent)]
    Grip(#[from] GripError),

    #[error(transparent)]
    Homing(#[from] HomingError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Hand {
    /// Build the hand described by `params` on the given bus.
    pub fn new(bus: SharedBus, params: &HandParams) -> Result<Self, HandError> {
        params.are_valid()?;

        Ok(match params {
            HandParams::ForceGripper(p) => Hand::ForceGripper(ForceGripper::new(bus, p)?),
            HandParams::OrbitaWrist(p) => Hand::OrbitaWrist(OrbitaWrist::new(bus, p)?),
        })
    }

    pub fn capabilities(&mut self) -> &mut dyn Capabilities {
        match self {
            Hand::ForceGripper(h) => h,
            Hand::OrbitaWrist(h) => h,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Hand::ForceGripper(h) => h.name(),
            Hand::OrbitaWrist(h) => h.name(),
        }
    }

    /// True for hands which need homing after power-up.
    pub fn needs_homing(&self) -> bool {
        matches!(self, Hand::OrbitaWrist(_))
    }

    /// Execute a command, blocking until the hand operation returns.
    pub fn execute(
        &mut self,
        cmd: &HandCmd,
        cancel: &CancelToken,
    ) -> Result<HandResponse, HandError> {
        debug!("{} executing {:?}", self.name(), cmd);

        let hand = self.capabilities();

        let response = match cmd {
            HandCmd::Home => {
                let report = hand.home(cancel)?;
                info!("{} homed in {:.2} s", hand.name(), report.total_duration_s);
                HandResponse::Done
            }
            HandCmd::Open { end_pos, duration_s } => {
                hand.open(*end_pos, *duration_s)?;
                HandResponse::Done
            }
            HandCmd::Close {
                end_pos,
                duration_s,
                target_grip_force,
            } => {
                let outcome = hand.close(*end_pos, *duration_s, *target_grip_force, cancel)?;
                info!(
                    "{} closed ({:?}), holding at {:.2}",
                    hand.name(),
                    outcome.exit,
                    outcome.hold_position
                );
                HandResponse::Done
            }
            HandCmd::Orient { qw, qx, qy, qz } => {
                hand.orient(&orientation_from_wxyz([*qw, *qx, *qy, *qz])?)?;
                HandResponse::Done
            }
            HandCmd::Orientation => HandResponse::Orientation(wxyz(&hand.orientation()?)),
            HandCmd::GripForce => HandResponse::GripForce(hand.grip_force()?),
        };

        Ok(response)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Normalise `[w, x, y, z]` into an orientation.
pub fn orientation_from_wxyz(q: [f64; 4]) -> Result<UnitQuaternion<f64>, HandError> {
    let quat = Quaternion::new(q[0], q[1], q[2], q[3]);

    if q.iter().any(|v| !v.is_finite()) || quat.norm() < MIN_QUATERNION_NORM {
        return Err(HandError::InvalidOrientation(q));
    }

    Ok(UnitQuaternion::from_quaternion(quat))
}

/// `[w, x, y, z]` components of an orientation.
pub fn wxyz(q: &UnitQuaternion<f64>) -> [f64; 4] {
    let q = q.quaternion();
    [q.w, q.i, q.j, q.k]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        grip::GripParams,
        homing::HomingParams,
        sim_bus::SimBus,
    };
    use std::{sync::Arc, thread, time::Duration};

    fn gripper_params() -> ForceGripperParams {
        ForceGripperParams {
            grip: GripParams {
                open_duration_s: 0.1,
                close_duration_s: 0.5,
                stop_settle_s: 0.02,
                hold_settle_s: 0.02,
                ..GripParams::default()
            },
            ..ForceGripperParams::default()
        }
    }

    fn wrist_params() -> OrbitaWristParams {
        OrbitaWristParams {
            homing: HomingParams {
                zero_settle_s: 0.0,
                release_settle_s: 0.0,
                seek_speed: 2000.0,
                seek_start_s: 0.02,
                poll_interval_s: 0.005,
                seek_timeout_s: Some(2.0),
                stop_zero_settle_s: 0.0,
                calib_settle_s: 0.15,
                final_zero_settle_s: 0.0,
                neutral_settle_s: 0.0,
                ..HomingParams::default()
            },
            orient_duration_s: 0.5,
            ..OrbitaWristParams::default()
        }
    }

    fn build(params: HandParams) -> Hand {
        let bus = Arc::new(SimBus::for_hand(&params));
        Hand::new(bus, &params).unwrap()
    }

    #[test]
    fn test_force_gripper_commands() {
        let mut hand = build(HandParams::ForceGripper(gripper_params()));
        let cancel = CancelToken::new();
        assert!(!hand.needs_homing());

        // Open, no object in the gripper
        let force = hand.execute(&HandCmd::GripForce, &cancel).unwrap();
        assert_eq!(force, HandResponse::GripForce(0.0));

        let close = HandCmd::Close {
            end_pos: None,
            duration_s: None,
            target_grip_force: None,
        };
        assert_eq!(hand.execute(&close, &cancel).unwrap(), HandResponse::Done);

        match hand.execute(&HandCmd::GripForce, &cancel).unwrap() {
            HandResponse::GripForce(f) => assert!(f > 0.0),
            r => panic!("Unexpected response {:?}", r),
        }

        let open = HandCmd::Open {
            end_pos: Some(-20.0),
            duration_s: None,
        };
        assert_eq!(hand.execute(&open, &cancel).unwrap(), HandResponse::Done);
        assert_eq!(
            hand.execute(&HandCmd::GripForce, &cancel).unwrap(),
            HandResponse::GripForce(0.0)
        );
    }

    #[test]
    fn test_unsupported() {
        let mut hand = build(HandParams::ForceGripper(gripper_params()));
        let cancel = CancelToken::new();

        assert!(matches!(
            hand.execute(&HandCmd::Home, &cancel),
            Err(HandError::Unsupported { capability: "home", .. })
        ));
        assert!(matches!(
            hand.execute(&HandCmd::Orientation, &cancel),
            Err(HandError::Unsupported { capability: "orientation", .. })
        ));

        let mut wrist = build(HandParams::OrbitaWrist(wrist_params()));
        assert!(matches!(
            wrist.execute(&HandCmd::GripForce, &cancel),
            Err(HandError::Unsupported { kind: "orbita_wrist", .. })
        ));
    }

    #[test]
    fn test_orbita_wrist_commands() {
        let mut hand = build(HandParams::OrbitaWrist(wrist_params()));
        let cancel = CancelToken::new();
        assert!(hand.needs_homing());

        match &hand {
            Hand::OrbitaWrist(w) => assert!(w.actuator().is_tracking()),
            _ => panic!("Wrong hand kind"),
        }

        assert_eq!(hand.execute(&HandCmd::Home, &cancel).unwrap(), HandResponse::Done);

        // Not normalised on purpose
        let orient = HandCmd::Orient {
            qw: 2.0,
            qx: 0.2,
            qy: 0.0,
            qz: 0.1,
        };
        assert_eq!(hand.execute(&orient, &cancel).unwrap(), HandResponse::Done);

        // Let the motions finish and the disks settle on the last tick
        thread::sleep(Duration::from_millis(700));

        let expected = orientation_from_wxyz([2.0, 0.2, 0.0, 0.1]).unwrap();
        match hand.execute(&HandCmd::Orientation, &cancel).unwrap() {
            HandResponse::Orientation(q) => {
                let q = orientation_from_wxyz(q).unwrap();
                assert!(q.angle_to(&expected) < 1e-6);
            }
            r => panic!("Unexpected response {:?}", r),
        }
    }

    #[test]
    fn test_invalid_orientation() {
        assert!(matches!(
            orientation_from_wxyz([0.0; 4]),
            Err(HandError::InvalidOrientation(_))
        ));
        assert!(orientation_from_wxyz([1.0, std::f64::NAN, 0.0, 0.0]).is_err());

        let q = orientation_from_wxyz([0.0, 0.0, 0.0, 3.0]).unwrap();
        assert_eq!(wxyz(&q), [0.0, 0.0, 0.0, 1.0]);
    }
}
