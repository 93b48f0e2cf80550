//! # Force gripper hand

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use comms_if::bus::SharedBus;
use log::info;
use util::cancel::CancelToken;

use super::{Capabilities, HandError, ForceGripperParams};
use crate::{
    disk::DiskActuator,
    grip::{GripController, GripOutcome},
    load_sensor::LoadSensor,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Hand made of a wrist pitch and roll, a gripper and a load sensor measuring the grip force.
pub struct ForceGripper {
    name: String,

    /// Every motor of the hand by name, the gripper included.
    motors: HashMap<String, DiskActuator>,

    grip: GripController,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ForceGripper {
    pub fn new(bus: SharedBus, params: &ForceGripperParams) -> Result<Self, HandError> {
        params.are_valid()?;

        let mut motors = HashMap::new();
        for config in params.motors.iter() {
            let motor = DiskActuator::attach(bus.clone(), config.clone())?;
            motors.insert(config.name.clone(), motor);
        }

        let gripper = motors
            .get(&params.gripper)
            .cloned()
            .ok_or_else(|| HandError::MissingMotor(params.gripper.clone()))?;

        let sensor = LoadSensor::find(
            bus,
            &params.sensor_name,
            params.sensor_offset,
            params.sensor_scale,
        )?;

        let grip = GripController::new(gripper, sensor, params.grip.clone())?;

        info!(
            "Force gripper {} ready with {} motors",
            params.name,
            motors.len()
        );

        Ok(Self {
            name: params.name.clone(),
            motors,
            grip,
        })
    }

    /// Motor by name.
    pub fn motor(&self, name: &str) -> Option<&DiskActuator> {
        self.motors.get(name)
    }

    pub fn grip(&self) -> &GripController {
        &self.grip
    }
}

impl Capabilities for ForceGripper {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "force_gripper"
    }

    fn open(&mut self, end_pos: Option<f64>, duration_s: Option<f64>) -> Result<(), HandError> {
        let p = self.grip.params();
        let end_pos = end_pos.unwrap_or(p.open_end_pos);
        let duration_s = duration_s.unwrap_or(p.open_duration_s);

        Ok(self.grip.open(end_pos, duration_s)?)
    }

    fn close(
        &mut self,
        end_pos: Option<f64>,
        duration_s: Option<f64>,
        target_force: Option<f64>,
        cancel: &CancelToken,
    ) -> Result<GripOutcome, HandError> {
        let p = self.grip.params();
        let end_pos = end_pos.unwrap_or(p.close_end_pos);
        let duration_s = duration_s.unwrap_or(p.close_duration_s);
        let target_force = target_force.unwrap_or(p.target_force);

        Ok(self.grip.close(end_pos, duration_s, target_force, cancel)?)
    }

    fn grip_force(&mut self) -> Result<f64, HandError> {
        Ok(self.grip.grip_force()?)
    }
}
