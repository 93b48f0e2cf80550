//! # Equipment Interface
//!
//! This module defines the structures exchanged with equipment on the actuator bus.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod disk;
pub mod gateway;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use disk::*;
pub use gateway::*;
