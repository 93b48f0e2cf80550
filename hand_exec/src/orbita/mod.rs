//! # Orbita parallel wrist
//!
//! Three coupled disks which together orient a platform. The [`WristKinematicsModel`] converts
//! between platform orientations and disk angles, and the [`OrbitaActuator`] owns the disks and
//! the model.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod actuator;
mod model;
mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use actuator::{OrbitaActuator, OrbitaError, DISK_NAMES, TRACK_PERIOD};
pub use model::{KinematicsError, WristKinematicsModel, NUM_DISKS, RAW_PERIOD};
pub use params::OrbitaConfig;
