//! # Hand telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be executed by a hand.
///
/// Arguments left unset use the defaults from the hand's parameter file.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt, PartialEq)]
pub enum HandCmd {
    /// Run the homing (calibration) sequence.
    #[structopt(name = "home")]
    Home,

    /// Open the gripper with a plain interpolated move.
    #[structopt(name = "open")]
    Open {
        /// Open position of the gripper in degrees.
        #[structopt(long, allow_hyphen_values = true)]
        end_pos: Option<f64>,

        /// Duration of the move in seconds.
        #[structopt(long)]
        duration_s: Option<f64>,
    },

    /// Close the gripper until the target force or the travel limit is reached.
    #[structopt(name = "close")]
    Close {
        /// Closed position of the gripper in degrees.
        #[structopt(long, allow_hyphen_values = true)]
        end_pos: Option<f64>,

        /// Duration of the closing move in seconds.
        #[structopt(long)]
        duration_s: Option<f64>,

        /// Grip force at which closing stops.
        #[structopt(long)]
        target_grip_force: Option<f64>,
    },

    /// Orient the wrist platform to the given unit quaternion.
    #[structopt(name = "orient")]
    Orient {
        #[structopt(allow_hyphen_values = true)]
        qw: f64,
        #[structopt(allow_hyphen_values = true)]
        qx: f64,
        #[structopt(allow_hyphen_values = true)]
        qy: f64,
        #[structopt(allow_hyphen_values = true)]
        qz: f64,
    },

    /// Read back the wrist platform orientation.
    #[structopt(name = "orientation")]
    Orientation,

    /// Read the gripper load sensor.
    #[structopt(name = "force")]
    GripForce,
}

/// Response from the hand executable to a [`HandCmd`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HandResponse {
    /// The command completed.
    Done,

    /// Platform orientation as a `[w, x, y, z]` quaternion.
    Orientation([f64; 4]),

    /// Latest load sensor reading.
    GripForce(f64),

    /// The command failed, with a description of the failure.
    Error(String),
}
