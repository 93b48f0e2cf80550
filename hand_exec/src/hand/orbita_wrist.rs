//! # Orbita wrist hand

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::bus::SharedBus;
use log::{info, warn};
use nalgebra::UnitQuaternion;
use util::cancel::CancelToken;

use super::{Capabilities, HandError, OrbitaWristParams};
use crate::{
    disk::{self, Interpolation, Motion},
    homing::{self, HomingParams, HomingReport},
    orbita::{OrbitaActuator, TRACK_PERIOD},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Hand made of a single Orbita parallel wrist.
pub struct OrbitaWrist {
    wrist: OrbitaActuator,

    homing: HomingParams,

    orient_duration_s: f64,

    /// Motions of the last orient command, stopped before the next one starts.
    motions: Vec<Motion>,

    homed: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OrbitaWrist {
    pub fn new(bus: SharedBus, params: &OrbitaWristParams) -> Result<Self, HandError> {
        params.are_valid()?;

        let mut wrist =
            OrbitaActuator::new(&params.name, bus, params.disk_ids, params.orbita.clone())?;
        wrist.start_tracking(TRACK_PERIOD);

        info!("Orbita wrist {} ready, homing required", params.name);

        Ok(Self {
            wrist,
            homing: params.homing.clone(),
            orient_duration_s: params.orient_duration_s,
            motions: Vec::new(),
            homed: false,
        })
    }

    pub fn actuator(&self) -> &OrbitaActuator {
        &self.wrist
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    fn stop_motions(&mut self) -> Result<(), HandError> {
        let result = disk::stop_all(&mut self.motions);
        self.motions.clear();
        Ok(result?)
    }
}

impl Capabilities for OrbitaWrist {
    fn name(&self) -> &str {
        self.wrist.name()
    }

    fn kind(&self) -> &'static str {
        "orbita_wrist"
    }

    fn home(&mut self, cancel: &CancelToken) -> Result<HomingReport, HandError> {
        self.stop_motions()?;
        self.homed = false;

        let report = homing::home(&mut self.wrist, &self.homing, cancel)?;
        self.homed = true;

        Ok(report)
    }

    fn orient(&mut self, orientation: &UnitQuaternion<f64>) -> Result<(), HandError> {
        if !self.homed {
            warn!("Orienting {} before it was homed", self.wrist.name());
        }

        self.stop_motions()?;
        self.motions = self.wrist.goto_orientation(
            orientation,
            self.orient_duration_s,
            Interpolation::MinJerk,
        )?;

        Ok(())
    }

    /// Read back the platform orientation, once the last orient motion has finished.
    fn orientation(&mut self) -> Result<UnitQuaternion<f64>, HandError> {
        for m in self.motions.iter_mut() {
            m.wait()?;
        }
        self.motions.clear();

        Ok(self.wrist.orientation()?)
    }
}
