//! # Orbita actuator
//!
//! The raw encoders of the disks wrap many times per turn of the platform, so the actuator can
//! sample the disk positions in the background with [`OrbitaActuator::start_tracking`]. Each
//! sample goes through the readback history of the kinematics model, which then stays valid
//! however rarely the orientation is read.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use comms_if::{
    bus::SharedBus,
    eqpt::{DiskCmd, DiskId, PidGains},
};
use log::{debug, info, trace, warn};
use nalgebra::UnitQuaternion;
use thiserror::Error;

use super::{model::NUM_DISKS, KinematicsError, OrbitaConfig, WristKinematicsModel};
use crate::disk::{DiskActuator, DiskConfig, DiskError, DiskKind, Interpolation, Motion, Orientation};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Names of the disks, from the platform side down.
pub const DISK_NAMES: [&str; NUM_DISKS] = ["disk_top", "disk_middle", "disk_bottom"];

/// Period of the background position sampling.
pub const TRACK_PERIOD: Duration = Duration::from_millis(10);

/// Headroom of the disk speed limit over the peak speed of an orientation trajectory.
const SPEED_MARGIN: f64 = 1.5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An Orbita wrist: three disks on one bus and the kinematics model that couples them.
pub struct OrbitaActuator {
    name: String,

    disks: [DiskActuator; NUM_DISKS],

    /// Shared with the tracking thread, which only feeds it readings.
    model: Arc<Mutex<WristKinematicsModel>>,

    tracker: Option<Tracker>,
}

/// Background sampler of the disk positions.
struct Tracker {
    run: Arc<AtomicBool>,

    handle: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OrbitaError {
    #[error("Disk error: {0}")]
    Disk(#[from] DiskError),

    #[error("Kinematics error: {0}")]
    Kinematics(#[from] KinematicsError),

    #[error("The kinematics model is unavailable (lock poisoned)")]
    Poisoned,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OrbitaActuator {
    /// Attach to the three disks and configure their position loops and drive trains.
    pub fn new(
        name: &str,
        bus: SharedBus,
        disk_ids: [DiskId; NUM_DISKS],
        config: OrbitaConfig,
    ) -> Result<Self, OrbitaError> {
        let model = WristKinematicsModel::new(config)?;

        let attach = |i: usize| {
            DiskActuator::attach(
                bus.clone(),
                DiskConfig {
                    name: format!("{}_{}", name, DISK_NAMES[i]),
                    id: disk_ids[i],
                    offset: 0.0,
                    orientation: Orientation::Direct,
                    link_translation: [0.0; 3],
                    link_rotation: [0.0; 3],
                    kind: DiskKind::OrbitaDisk,
                },
            )
        };
        let disks = [attach(0)?, attach(1)?, attach(2)?];

        let config = model.config();
        let pid = PidGains {
            p: config.pid[0],
            i: config.pid[1],
            d: config.pid[2],
        };

        for disk in disks.iter() {
            disk.send(DiskCmd::Pid(pid))?;
            disk.send(DiskCmd::DriveTrain {
                reduction: config.reduction,
                wheel_size_mm: config.wheel_size,
                encoder_res: config.encoder_res,
            })?;
        }

        info!("Orbita actuator {} ready on {:?}", name, disk_ids);

        Ok(Self {
            name: name.into(),
            disks,
            model: Arc::new(Mutex::new(model)),
            tracker: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disks(&self) -> &[DiskActuator; NUM_DISKS] {
        &self.disks
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Start sampling the disk positions every `period` on a background thread.
    ///
    /// Readings only unwrap correctly if no disk travels more than half a raw turn between two
    /// samples, so `period` must be short compared to the disk speeds.
    pub fn start_tracking(&mut self, period: Duration) {
        if self.tracker.is_some() {
            return;
        }

        let run = Arc::new(AtomicBool::new(true));
        let bg_run = run.clone();
        let disks = self.disks.clone();
        let model = self.model.clone();
        let name = self.name.clone();

        let handle = thread::spawn(move || {
            while bg_run.load(Ordering::SeqCst) {
                match model.lock() {
                    Ok(mut model) => {
                        let sample = read_positions(&disks)
                            .map_err(OrbitaError::from)
                            .and_then(|raw| model.unwrap(raw).map_err(OrbitaError::from));

                        if let Err(e) = sample {
                            trace!("{} tracking sample skipped: {}", name, e);
                        }
                    }
                    Err(_) => {
                        warn!("{} kinematics model poisoned, tracking stopped", name);
                        break;
                    }
                }

                thread::sleep(period);
            }
        });

        debug!("{} tracking every {:?}", self.name, period);

        self.tracker = Some(Tracker {
            run,
            handle: Some(handle),
        });
    }

    /// Stop the background sampling, waiting for the sampler to exit.
    pub fn stop_tracking(&mut self) {
        if let Some(mut tracker) = self.tracker.take() {
            tracker.run.store(false, Ordering::SeqCst);

            if let Some(handle) = tracker.handle.take() {
                if handle.join().is_err() {
                    warn!("{} tracking thread panicked", self.name);
                }
            }
        }
    }

    pub fn set_compliant(&self, compliant: bool) -> Result<(), OrbitaError> {
        for disk in self.disks.iter() {
            disk.set_compliant(compliant)?;
        }
        Ok(())
    }

    /// Define the present position of every disk as zero.
    ///
    /// The angle history of the model is cleared at the same time, since it refers to the old
    /// zero. No tracking sample can land between the two.
    pub fn set_to_zero(&mut self) -> Result<(), OrbitaError> {
        let mut model = self.lock_model()?;

        for disk in self.disks.iter() {
            disk.set_to_zero()?;
        }
        model.reset_last_angles();

        debug!("{} disks zeroed", self.name);
        Ok(())
    }

    /// Clear the angle history of the kinematics model.
    pub fn reset_model(&mut self) -> Result<(), OrbitaError> {
        self.lock_model()?.reset_last_angles();
        Ok(())
    }

    /// Present rotation speed of each disk.
    pub fn rot_speeds(&self) -> Result<[f64; NUM_DISKS], OrbitaError> {
        Ok([
            self.disks[0].rot_speed()?,
            self.disks[1].rot_speed()?,
            self.disks[2].rot_speed()?,
        ])
    }

    /// Present raw position of each disk, as read on the bus.
    pub fn present_positions(&self) -> Result<[f64; NUM_DISKS], OrbitaError> {
        Ok(read_positions(&self.disks)?)
    }

    /// Read the disk positions and unwrap them against the readback history.
    pub fn track(&mut self) -> Result<[f64; NUM_DISKS], OrbitaError> {
        let mut model = self.lock_model()?;
        let raw = read_positions(&self.disks)?;
        Ok(model.unwrap(raw)?)
    }

    /// Command the disk targets of an orientation.
    ///
    /// Returns once the targets are issued, without waiting for the disks to reach them. The
    /// disks are commanded one after the other and may not start moving together.
    pub fn orient(&mut self, orientation: &UnitQuaternion<f64>) -> Result<(), OrbitaError> {
        let targets = self.lock_model()?.inverse(orientation)?;

        debug!("{} orient {:?} -> {:?}", self.name, orientation, targets);

        for (disk, target) in self.disks.iter().zip(targets.iter()) {
            disk.set_target_rot_position(*target)?;
        }

        Ok(())
    }

    /// Move to an orientation with one interpolated motion per disk.
    ///
    /// The trajectories start from the unwrapped disk positions and the speed limit of each disk
    /// is raised to let it follow its trajectory. The motions run in the background, the caller
    /// owns them and may stop or wait on them.
    pub fn goto_orientation(
        &mut self,
        orientation: &UnitQuaternion<f64>,
        duration_s: f64,
        interpolation: Interpolation,
    ) -> Result<Vec<Motion>, OrbitaError> {
        let (positions, targets) = {
            let mut model = self.lock_model()?;
            let positions = model.unwrap(read_positions(&self.disks)?)?;
            (positions, model.inverse(orientation)?)
        };

        for i in 0..NUM_DISKS {
            let speed = (targets[i] - positions[i]).abs() / duration_s
                * interpolation.peak_rate()
                * SPEED_MARGIN;

            if speed.is_finite() && speed > 0.0 {
                self.disks[i].set_target_rot_speed(speed)?;
            }
        }

        debug!(
            "{} goto orientation {:?} -> {:?} in {:.2} s",
            self.name, orientation, targets, duration_s
        );

        let mut motions = Vec::with_capacity(NUM_DISKS);
        for i in 0..NUM_DISKS {
            match self.disks[i].goto_from(
                positions[i],
                targets[i],
                duration_s,
                interpolation,
                false,
            ) {
                Ok(m) => motions.push(m),
                Err(e) => {
                    // Don't leave the other disks moving on their own
                    for mut m in motions {
                        m.stop().ok();
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(motions)
    }

    /// Current platform orientation, from the present disk positions.
    pub fn orientation(&mut self) -> Result<UnitQuaternion<f64>, OrbitaError> {
        let mut model = self.lock_model()?;
        let raw = read_positions(&self.disks)?;
        Ok(model.forward(raw)?)
    }

    fn lock_model(&self) -> Result<MutexGuard<'_, WristKinematicsModel>, OrbitaError> {
        self.model.lock().map_err(|_| OrbitaError::Poisoned)
    }
}

impl Drop for OrbitaActuator {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn read_positions(disks: &[DiskActuator; NUM_DISKS]) -> Result<[f64; NUM_DISKS], DiskError> {
    Ok([
        disks[0].present_position()?,
        disks[1].present_position()?,
        disks[2].present_position()?,
    ])
}
