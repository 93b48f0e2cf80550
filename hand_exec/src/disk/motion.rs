//! # Interpolated motions
//!
//! A [`Motion`] is a time-parameterised trajectory streamed to one disk by a driver thread. Each
//! tick of the driver writes the next interpolated position to the disk's position channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use util::maths;

use super::{DiskActuator, DiskError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period between two interpolation ticks.
pub const INTERP_PERIOD: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a running (or finished) motion.
///
/// Dropping the handle does not stop the motion, it detaches it.
pub struct Motion {
    shared: Arc<Shared>,

    driver: Option<thread::JoinHandle<()>>,

    goal: f64,
}

/// State shared between a motion handle and its driver.
#[derive(Default)]
struct Shared {
    stop: AtomicBool,

    finished: AtomicBool,

    /// First transport error hit by the driver.
    error: Mutex<Option<DiskError>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Shape of the trajectory between the start and goal positions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,

    /// Minimum jerk profile, zero velocity and acceleration at both ends.
    MinJerk,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::MinJerk
    }
}

impl Interpolation {
    /// Fraction of the way from start to goal at normalised time `tau`.
    pub fn fraction(self, tau: f64) -> f64 {
        match self {
            Interpolation::Linear => maths::clamp(tau, 0.0, 1.0),
            Interpolation::MinJerk => maths::min_jerk(tau),
        }
    }

    /// Peak speed of the profile relative to the average speed of the move.
    pub fn peak_rate(self) -> f64 {
        match self {
            Interpolation::Linear => 1.0,
            Interpolation::MinJerk => 1.875,
        }
    }
}

impl Motion {
    pub(super) fn start(
        disk: DiskActuator,
        start: f64,
        goal: f64,
        duration: Duration,
        interpolation: Interpolation,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let driver_shared = shared.clone();

        let driver = thread::spawn(move || {
            drive(&disk, &driver_shared, start, goal, duration, interpolation)
        });

        Self {
            shared,
            driver: Some(driver),
            goal,
        }
    }

    /// Final position of the trajectory.
    pub fn goal(&self) -> f64 {
        self.goal
    }

    /// True once the driver has stopped issuing positions.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Cancel the motion, freezing the last commanded position.
    ///
    /// When this returns the driver has exited, so no interpolation tick can be written after
    /// any command issued by the caller from now on.
    pub fn stop(&mut self) -> Result<(), DiskError> {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Block until the full trajectory has been issued.
    pub fn wait(&mut self) -> Result<(), DiskError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), DiskError> {
        if let Some(driver) = self.driver.take() {
            driver.join().map_err(|_| DiskError::DriverPanicked)?;
        }

        match self.shared.error.lock() {
            Ok(mut e) => e.take().map_or(Ok(()), Err),
            Err(_) => Err(DiskError::DriverPanicked),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Stop every motion of a set, returning the first error.
pub fn stop_all(motions: &mut [Motion]) -> Result<(), DiskError> {
    let mut result = Ok(());

    for m in motions.iter_mut() {
        if let Err(e) = m.stop() {
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    result
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn drive(
    disk: &DiskActuator,
    shared: &Shared,
    start: f64,
    goal: f64,
    duration: Duration,
    interpolation: Interpolation,
) {
    let t0 = Instant::now();

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            trace!("{} motion stopped", disk.name());
            break;
        }

        let elapsed = t0.elapsed();
        let tau = if duration.as_secs_f64() > 0.0 {
            elapsed.as_secs_f64() / duration.as_secs_f64()
        } else {
            1.0
        };

        let position = start + (goal - start) * interpolation.fraction(tau);

        if let Err(e) = disk.set_position(position) {
            warn!("{} motion aborted: {}", disk.name(), e);
            if let Ok(mut slot) = shared.error.lock() {
                *slot = Some(e);
            }
            break;
        }

        if tau >= 1.0 {
            break;
        }

        let remaining = duration.checked_sub(elapsed).unwrap_or_default();
        thread::sleep(remaining.min(INTERP_PERIOD));
    }

    shared.finished.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        disk::{DiskConfig, DiskKind, Orientation},
        sim_bus::{SimBus, SimDisk},
    };
    use comms_if::eqpt::{DiskCmd, DiskId};
    use std::sync::Arc;

    fn servo(bus: &Arc<SimBus>) -> DiskActuator {
        DiskActuator::attach(
            bus.clone(),
            DiskConfig {
                name: "gripper".into(),
                id: DiskId(17),
                offset: 0.0,
                orientation: Orientation::Direct,
                link_translation: [0.0; 3],
                link_rotation: [0.0; 3],
                kind: DiskKind::Servo,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_fraction() {
        assert_eq!(Interpolation::Linear.fraction(0.25), 0.25);
        assert_eq!(Interpolation::Linear.fraction(1.5), 1.0);
        assert_eq!(Interpolation::MinJerk.fraction(0.0), 0.0);
        assert_eq!(Interpolation::MinJerk.fraction(1.0), 1.0);

        // Numerical slope of the minimum jerk profile at mid-course
        let h = 1e-6;
        let slope = (Interpolation::MinJerk.fraction(0.5 + h)
            - Interpolation::MinJerk.fraction(0.5 - h))
            / (2.0 * h);
        assert!((slope - Interpolation::MinJerk.peak_rate()).abs() < 1e-6);
    }

    #[test]
    fn test_wait_reaches_goal() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(-30.0)));
        let disk = servo(&bus);

        let t0 = Instant::now();
        let mut motion = disk.goto(30.0, 0.2, Interpolation::MinJerk, false).unwrap();
        motion.wait().unwrap();

        assert!(t0.elapsed() >= Duration::from_millis(200));
        assert!(motion.is_finished());
        assert!((disk.present_position().unwrap() - 30.0).abs() < 1e-9);

        // Every command is a goal position between the start and the goal
        let cmds = bus.commands(DiskId(17));
        assert!(cmds.len() > 2);
        for cmd in cmds {
            match cmd {
                DiskCmd::GoalPosition(p) => assert!(p >= -30.0 - 1e-9 && p <= 30.0 + 1e-9),
                c => panic!("Unexpected command {:?}", c),
            }
        }
    }

    #[test]
    fn test_stop_freezes_target() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(0.0)));
        let disk = servo(&bus);

        let mut motion = disk.goto(100.0, 1.0, Interpolation::Linear, false).unwrap();
        thread::sleep(Duration::from_millis(100));
        motion.stop().unwrap();

        let n_cmds = bus.commands(DiskId(17)).len();
        let frozen = disk.present_position().unwrap();
        assert!(frozen > 0.0 && frozen < 100.0);

        // Nothing is written after stop returned
        thread::sleep(Duration::from_millis(50));
        assert_eq!(bus.commands(DiskId(17)).len(), n_cmds);
        assert_eq!(disk.present_position().unwrap(), frozen);
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let bus = Arc::new(SimBus::new().with_disk(DiskId(17), SimDisk::servo(0.0)));
        let disk = servo(&bus);

        bus.set_connected(false);
        let err = disk.goto(10.0, 0.1, Interpolation::Linear, true);
        assert!(matches!(err, Err(DiskError::Transport(_))));

        bus.set_connected(true);
        let mut motion = disk.goto(10.0, 0.5, Interpolation::Linear, false).unwrap();
        bus.set_connected(false);
        assert!(matches!(motion.wait(), Err(DiskError::Transport(_))));
    }
}
