//! # Actuator bus
//!
//! The bus is the transport collaborator of the hand control layer. One bus instance represents
//! one physical bus segment (one port), shared by every disk and sensor attached to it. Command
//! issuance on a segment is serialised by the implementation, commands to one disk are applied
//! in the order they were sent, and telemetry is refreshed asynchronously by the bus's own
//! receive path.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use log::debug;

use crate::eqpt::{DiskCmd, DiskId, DiskTelemetry, ModuleId};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A reference-counted handle to a bus segment.
pub type SharedBus = Arc<dyn Bus>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Interface consumed from the bus/transport collaborator.
pub trait Bus: Send + Sync {
    /// Write a command to a disk.
    fn send(&self, id: DiskId, cmd: DiskCmd) -> Result<(), BusError>;

    /// Read the most recent telemetry sample of a disk.
    fn disk_telemetry(&self, id: DiskId) -> Result<DiskTelemetry, BusError>;

    /// Read the most recent raw counts of a sensor module.
    fn sensor_raw(&self, id: ModuleId) -> Result<f64, BusError>;

    /// Check that the given disk is present on the bus.
    fn find_disk(&self, id: DiskId) -> Result<(), BusError>;

    /// Resolve a named module (e.g. `"force_gripper"`) to its address.
    fn find_module(&self, name: &str) -> Result<ModuleId, BusError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pool of open bus segments keyed by their endpoint (port identity).
///
/// The pool only keeps weak references: a segment stays open for as long as some actuator holds
/// its handle, and asking for the same endpoint again while it is open returns the same segment.
#[derive(Default)]
pub struct BusPool {
    buses: HashMap<String, Weak<dyn Bus>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Transport failures.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("The bus is not connected")]
    NotConnected,

    #[error("Could not send the request on the bus: {0}")]
    SendError(String),

    #[error("Could not recieve a response from the bus: {0}")]
    RecvError(String),

    #[error("Could not (de)serialize a bus message: {0}")]
    SerializationError(serde_json::Error),

    #[error("Unexpected response from the bus: {0}")]
    UnexpectedResponse(String),

    #[error("The request was rejected: {0}")]
    Rejected(String),

    #[error("{0} is not present on the bus")]
    UnknownDisk(DiskId),

    #[error("{0} is not present on the bus")]
    UnknownSensor(ModuleId),

    #[error("No module named {0:?} on the bus")]
    UnknownModule(String),

    #[error("The bus state is unavailable (lock poisoned)")]
    Poisoned,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BusPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the open segment for `endpoint`, or open one with `open` if there is none.
    pub fn get_or_open<F>(&mut self, endpoint: &str, open: F) -> Result<SharedBus, BusError>
    where
        F: FnOnce(&str) -> Result<SharedBus, BusError>,
    {
        if let Some(bus) = self.buses.get(endpoint).and_then(Weak::upgrade) {
            debug!("Reusing open bus segment {}", endpoint);
            return Ok(bus);
        }

        let bus = open(endpoint)?;
        self.buses.insert(endpoint.to_string(), Arc::downgrade(&bus));
        debug!("Opened bus segment {}", endpoint);

        Ok(bus)
    }

    /// Number of segments which are still held by someone.
    pub fn num_open(&self) -> usize {
        self.buses
            .values()
            .filter(|b| b.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct NullBus;

    impl Bus for NullBus {
        fn send(&self, _id: DiskId, _cmd: DiskCmd) -> Result<(), BusError> {
            Ok(())
        }

        fn disk_telemetry(&self, _id: DiskId) -> Result<DiskTelemetry, BusError> {
            Ok(DiskTelemetry::default())
        }

        fn sensor_raw(&self, id: ModuleId) -> Result<f64, BusError> {
            Err(BusError::UnknownSensor(id))
        }

        fn find_disk(&self, _id: DiskId) -> Result<(), BusError> {
            Ok(())
        }

        fn find_module(&self, name: &str) -> Result<ModuleId, BusError> {
            Err(BusError::UnknownModule(name.into()))
        }
    }

    #[test]
    fn test_pool_shares_segments() {
        let mut pool = BusPool::new();
        let mut opened = 0;

        let a = pool
            .get_or_open("ipc:///tmp/bus0", |_| {
                opened += 1;
                Ok(Arc::new(NullBus) as SharedBus)
            })
            .unwrap();
        let b = pool
            .get_or_open("ipc:///tmp/bus0", |_| {
                opened += 1;
                Ok(Arc::new(NullBus) as SharedBus)
            })
            .unwrap();

        assert_eq!(opened, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.num_open(), 1);

        // Once every holder is gone the segment is reopened on demand
        drop(a);
        drop(b);
        assert_eq!(pool.num_open(), 0);
        pool.get_or_open("ipc:///tmp/bus0", |_| Ok(Arc::new(NullBus) as SharedBus))
            .unwrap();
    }
}
