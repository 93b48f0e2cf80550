//! # Bus gateway messages
//!
//! Requests and responses exchanged between a networked bus client and the gateway which owns the
//! physical bus segment.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{DiskCmd, DiskId, DiskTelemetry, ModuleId};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Request sent by a client to the bus gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BusRequest {
    /// Write a command to a disk.
    Command { id: DiskId, cmd: DiskCmd },

    /// Read the latest telemetry of a disk.
    Telemetry { id: DiskId },

    /// Read the latest raw counts of a sensor module.
    SensorRaw { id: ModuleId },

    /// Check that a disk is present on the bus.
    FindDisk { id: DiskId },

    /// Resolve a named module to its address.
    FindModule { name: String },
}

/// Response from the bus gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BusResponse {
    /// The command was accepted.
    Ack,

    Telemetry(DiskTelemetry),

    SensorRaw(f64),

    Module(ModuleId),

    /// The addressed equipment isn't on the bus.
    NotFound,

    /// The request was rejected by the gateway.
    Rejected(String),
}
