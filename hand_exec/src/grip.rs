//! # Grip controller
//!
//! Closes a gripper until the load sensor reports the target force or the gripper reaches its
//! near-closed position, then backs off slightly and holds. Opening is a plain blocking move.
//!
//! Positions are in the gripper's logical frame. The closing direction is the direction from
//! the present position to the requested end position; the near-closed threshold and the
//! backoff are both taken along that direction.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;
use util::{cancel::CancelToken, time};

use crate::{
    disk::{DiskActuator, DiskError, Interpolation},
    load_sensor::{LoadSensor, SensorError},
    params::{check_finite, check_positive, ParamsError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Grip parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GripParams {
    /// Default end position of `open`.
    ///
    /// Units: degrees
    pub open_end_pos: f64,

    /// Default duration of `open`.
    ///
    /// Units: seconds
    pub open_duration_s: f64,

    /// Default end position of `close`.
    ///
    /// Units: degrees
    pub close_end_pos: f64,

    /// Default duration of `close`.
    ///
    /// Units: seconds
    pub close_duration_s: f64,

    /// Default target force of `close`.
    pub target_force: f64,

    /// Position past which the gripper is considered closed, whatever the load.
    ///
    /// Units: degrees
    pub near_closed_pos: f64,

    /// Distance backed off from the stopped position before holding.
    ///
    /// Units: degrees
    pub backoff: f64,

    /// Period of the force and position polling.
    ///
    /// Units: seconds
    pub poll_interval_s: f64,

    /// Pause between stopping the motion and reading the stopped position.
    ///
    /// Units: seconds
    pub stop_settle_s: f64,

    /// Pause after commanding the hold position.
    ///
    /// Units: seconds
    pub hold_settle_s: f64,

    /// Time allowed past the motion duration before the force wait gives up, `None` to wait
    /// forever.
    ///
    /// Units: seconds
    pub force_wait_margin_s: Option<f64>,

    pub interpolation: Interpolation,
}

/// Gripper disk and load sensor driven together.
pub struct GripController {
    gripper: DiskActuator,
    sensor: LoadSensor,
    params: GripParams,
}

/// Result of a `close`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripOutcome {
    pub exit: GripExit,

    /// Position read after the motion was stopped.
    pub stop_position: f64,

    /// Position commanded for the hold.
    pub hold_position: f64,

    /// Last load read before leaving the force wait.
    pub load: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Why the force wait of a `close` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripExit {
    /// The load reached the target force.
    ForceReached,

    /// The gripper crossed the near-closed position.
    TravelLimit,

    /// Neither happened within the motion duration plus the margin.
    Timeout,
}

#[derive(Debug, Error)]
pub enum GripError {
    #[error("Invalid grip parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Invalid target force {0}")]
    InvalidForce(f64),

    #[error("Gripper error: {0}")]
    Disk(#[from] DiskError),

    #[error("Load sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Grip cancelled")]
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for GripParams {
    fn default() -> Self {
        Self {
            open_end_pos: -30.0,
            open_duration_s: 1.0,
            close_end_pos: 30.0,
            close_duration_s: 1.0,
            target_force: 100.0,
            near_closed_pos: 15.0,
            backoff: 2.0,
            poll_interval_s: 0.01,
            stop_settle_s: 0.1,
            hold_settle_s: 0.5,
            force_wait_margin_s: Some(2.0),
            interpolation: Interpolation::MinJerk,
        }
    }
}

impl GripParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        check_finite("open_end_pos", self.open_end_pos)?;
        check_finite("close_end_pos", self.close_end_pos)?;
        check_finite("near_closed_pos", self.near_closed_pos)?;
        check_finite("target_force", self.target_force)?;
        check_positive("poll_interval_s", self.poll_interval_s)?;

        if !(self.backoff >= 0.0 && self.backoff.is_finite()) {
            return Err(ParamsError::NotPositive("backoff", self.backoff));
        }
        if let Some(m) = self.force_wait_margin_s {
            check_finite("force_wait_margin_s", m)?;
        }

        for (name, seconds) in [
            ("open_duration_s", self.open_duration_s),
            ("close_duration_s", self.close_duration_s),
            ("stop_settle_s", self.stop_settle_s),
            ("hold_settle_s", self.hold_settle_s),
        ]
        .iter()
        {
            check_finite(*name, *seconds)?;
        }

        Ok(())
    }
}

impl GripController {
    pub fn new(
        gripper: DiskActuator,
        sensor: LoadSensor,
        params: GripParams,
    ) -> Result<Self, GripError> {
        params.are_valid()?;

        Ok(Self {
            gripper,
            sensor,
            params,
        })
    }

    pub fn params(&self) -> &GripParams {
        &self.params
    }

    pub fn gripper(&self) -> &DiskActuator {
        &self.gripper
    }

    pub fn sensor(&self) -> &LoadSensor {
        &self.sensor
    }

    /// Present load on the gripper.
    pub fn grip_force(&self) -> Result<f64, GripError> {
        Ok(self.sensor.load()?)
    }

    /// Move to `end_pos` over `duration_s`, blocking until the whole trajectory is issued.
    pub fn open(&self, end_pos: f64, duration_s: f64) -> Result<(), GripError> {
        debug!("Opening to {:.2} in {:.2} s", end_pos, duration_s);

        self.gripper
            .goto(end_pos, duration_s, self.params.interpolation, true)?;
        Ok(())
    }

    /// Close toward `end_pos` until `target_force` is reached or the gripper is nearly closed.
    ///
    /// The closing motion is stopped as soon as either condition is met, then a hold position
    /// backed off from the stopped position is commanded. The hold never goes past `end_pos`.
    pub fn close(
        &self,
        end_pos: f64,
        duration_s: f64,
        target_force: f64,
        cancel: &CancelToken,
    ) -> Result<GripOutcome, GripError> {
        if !target_force.is_finite() {
            return Err(GripError::InvalidForce(target_force));
        }

        let start = self.gripper.present_position()?;
        let sign = if end_pos >= start { 1.0 } else { -1.0 };

        let mut motion = self
            .gripper
            .goto(end_pos, duration_s, self.params.interpolation, false)?;

        let (exit, load) = match self.wait_for_grip(sign, duration_s, target_force, cancel) {
            Ok(r) => r,
            Err(e) => {
                if let Err(stop_err) = motion.stop() {
                    warn!("Could not stop the closing motion: {}", stop_err);
                }
                return Err(e);
            }
        };

        // No interpolation tick can land after this returns
        motion.stop()?;
        time::sleep_s(self.params.stop_settle_s);

        let stop_position = self.gripper.present_position()?;
        let mut hold_position = stop_position - self.params.backoff * sign;
        if (hold_position - end_pos) * sign > 0.0 {
            hold_position = end_pos;
        }

        debug!(
            "Grip exit {:?} at {:.2} (load {:.1}), holding at {:.2}",
            exit, stop_position, load, hold_position
        );

        self.gripper.set_position(hold_position)?;
        time::sleep_s(self.params.hold_settle_s);

        Ok(GripOutcome {
            exit,
            stop_position,
            hold_position,
            load,
        })
    }

    /// Close with the default parameters.
    pub fn close_default(&self, cancel: &CancelToken) -> Result<GripOutcome, GripError> {
        self.close(
            self.params.close_end_pos,
            self.params.close_duration_s,
            self.params.target_force,
            cancel,
        )
    }

    /// Poll the load and position until one of the exit conditions is met.
    fn wait_for_grip(
        &self,
        sign: f64,
        duration_s: f64,
        target_force: f64,
        cancel: &CancelToken,
    ) -> Result<(GripExit, f64), GripError> {
        let t0 = Instant::now();
        let deadline_s = self.params.force_wait_margin_s.map(|m| duration_s + m);

        loop {
            if cancel.is_cancelled() {
                return Err(GripError::Cancelled);
            }

            let load = self.sensor.load()?;
            let position = self.gripper.present_position()?;

            if load >= target_force {
                return Ok((GripExit::ForceReached, load));
            }
            if (self.params.near_closed_pos - position) * sign <= 0.0 {
                return Ok((GripExit::TravelLimit, load));
            }
            if deadline_s.map_or(false, |d| t0.elapsed().as_secs_f64() > d) {
                warn!(
                    "Force wait timed out at {:.2} with load {:.1} (target {:.1})",
                    position, load, target_force
                );
                return Ok((GripExit::Timeout, load));
            }

            time::sleep_s(self.params.poll_interval_s);
        }
    }
}
