//! # Hand library.
//!
//! Actuator control layer for the hand variants: disk actuators and their motions, the load
//! sensor, the Orbita wrist kinematics model, homing and the force-gated grip controller.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Disk actuator - one rotary disk or motor on the bus, and its interpolated motions
pub mod disk;

/// Grip controller - closes the gripper until a target force or the travel limit is reached
pub mod grip;

/// Hand variants and the capability interface they are driven through
pub mod hand;

/// Hand server - recieves hand commands from the network
pub mod hand_server;

/// Homing - calibration sequence establishing the absolute zero of the wrist disks
pub mod homing;

/// Load sensor - scalar force channel of the gripper
pub mod load_sensor;

/// Orbita parallel wrist - kinematics model and actuator
pub mod orbita;

/// Executable parameters
pub mod params;

/// Simulated bus - in-process bus used for simulation runs and tests
pub mod sim_bus;
