//! # Load sensor
//!
//! Single scalar force channel, read from a named sensor module on the bus. The reading is
//! normalised on the host as `load = (raw - offset) * scale`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    bus::{BusError, SharedBus},
    eqpt::ModuleId,
};
use log::debug;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct LoadSensor {
    bus: SharedBus,

    id: ModuleId,

    /// Raw counts corresponding to zero force.
    offset: f64,

    /// Counts-to-force factor.
    scale: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Transport failure: {0}")]
    Transport(#[from] BusError),

    #[error("Invalid sensor calibration (offset {offset}, scale {scale})")]
    InvalidCalibration { offset: f64, scale: f64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LoadSensor {
    /// Resolve the sensor module `name` on the bus and bind to it with the given calibration.
    pub fn find(bus: SharedBus, name: &str, offset: f64, scale: f64) -> Result<Self, SensorError> {
        if !offset.is_finite() || !scale.is_finite() || scale == 0.0 {
            return Err(SensorError::InvalidCalibration { offset, scale });
        }

        let id = bus.find_module(name)?;
        debug!("Load sensor {:?} found at {}", name, id);

        Ok(Self {
            bus,
            id,
            offset,
            scale,
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Latest raw counts from the sensor.
    pub fn raw(&self) -> Result<f64, SensorError> {
        Ok(self.bus.sensor_raw(self.id)?)
    }

    /// Latest calibrated load.
    pub fn load(&self) -> Result<f64, SensorError> {
        Ok((self.raw()? - self.offset) * self.scale)
    }

    /// Take the present raw reading as the zero-force offset.
    pub fn tare(&mut self) -> Result<(), SensorError> {
        self.offset = self.raw()?;
        debug!("Load sensor {} tared at {}", self.id, self.offset);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_bus::{SimBus, SimDisk};
    use comms_if::eqpt::DiskId;
    use std::sync::Arc;

    fn bus() -> Arc<SimBus> {
        Arc::new(
            SimBus::new()
                .with_disk(DiskId(17), SimDisk::servo(12.0))
                .with_load_sensor("force_gripper", ModuleId(40), DiskId(17), |pos| {
                    4.0 + pos * 0.001
                }),
        )
    }

    #[test]
    fn test_load_calibration() {
        let sensor = LoadSensor::find(bus(), "force_gripper", 4.0, 10000.0).unwrap();

        assert_eq!(sensor.id(), ModuleId(40));
        assert!((sensor.raw().unwrap() - 4.012).abs() < 1e-12);
        assert!((sensor.load().unwrap() - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_tare() {
        let mut sensor = LoadSensor::find(bus(), "force_gripper", 0.0, 10000.0).unwrap();

        sensor.tare().unwrap();
        assert!(sensor.load().unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_find_errors() {
        assert!(matches!(
            LoadSensor::find(bus(), "force_gripper", 4.0, 0.0),
            Err(SensorError::InvalidCalibration { .. })
        ));
        assert!(matches!(
            LoadSensor::find(bus(), "palm_sensor", 4.0, 1.0),
            Err(SensorError::Transport(BusError::UnknownModule(_)))
        ));
    }
}
