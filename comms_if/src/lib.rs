//! # Communications interface crate.
//!
//! Provides the interfaces between the hand control software and the outside world: the actuator
//! bus consumed by the control layer and the command protocol served by the hand executable.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Abstract actuator bus shared by all the disks and sensors of one bus segment
pub mod bus;

/// Command and telemetry definitions for equipment on the bus (disks, load sensors)
pub mod eqpt;

/// Network module
pub mod net;

/// Hand commands accepted by the hand executable
pub mod tc;
