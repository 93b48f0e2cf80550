//! # Homing
//!
//! One-shot calibration of an Orbita wrist, establishing the absolute zero of its disks after
//! power-up. The sequence drives every disk into its hard stop, uses the stop as a reference and
//! then moves to a known calibration offset which becomes the logical zero.
//!
//! Phases run strictly in order, see [`HomingPhase`]. The hard stop seek is bounded by a timeout
//! and every wait can be interrupted with a [`CancelToken`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod stall;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, time::Instant};

use log::{info, trace, warn};
use nalgebra::UnitQuaternion;
use serde::Deserialize;
use thiserror::Error;
use util::cancel::CancelToken;

use crate::{
    disk::DiskError,
    orbita::{OrbitaActuator, OrbitaError},
    params::{check_finite, check_positive, ParamsError},
};

pub use stall::StallDetector;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Homing parameters.
///
/// All durations are in seconds, positions in raw disk degrees.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HomingParams {
    /// Pause after zeroing the encoders.
    pub zero_settle_s: f64,

    /// Pause after releasing compliance.
    pub release_settle_s: f64,

    /// Speed the disks seek the hard stop at.
    ///
    /// Units: degrees/second
    pub seek_speed: f64,

    /// Seek target, beyond the physical travel.
    pub seek_target: f64,

    /// Time the disks are left to get moving before stall detection starts.
    pub seek_start_s: f64,

    /// Number of speed samples averaged by the stall detector.
    pub window_size: usize,

    /// Period between two speed samples, and the granularity of cancellation checks.
    pub poll_interval_s: f64,

    /// Give up on the seek after this long, `None` to wait forever.
    pub seek_timeout_s: Option<f64>,

    /// Pause after zeroing at the hard stop.
    pub stop_zero_settle_s: f64,

    /// Position of the calibration point relative to the hard stop.
    pub calib_offset: f64,

    /// Time allowed to reach the calibration point.
    pub calib_settle_s: f64,

    /// Pause after the final zero.
    pub final_zero_settle_s: f64,

    /// Time allowed to reach the neutral orientation.
    pub neutral_settle_s: f64,
}

/// Summary of a completed homing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HomingReport {
    /// Number of speed samples taken before every disk stalled.
    pub seek_samples: usize,

    /// Duration of the seek, from the first sample to the stall.
    ///
    /// Units: seconds
    pub seek_duration_s: f64,

    /// Duration of the whole sequence.
    ///
    /// Units: seconds
    pub total_duration_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Phases of the homing sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Define the arbitrary power-up reading as zero.
    ZeroEncoders,

    /// Turn the holding torque on.
    ReleaseCompliance,

    /// Drive every disk into its hard stop and wait for all of them to stall.
    SeekHardstop,

    /// The hard stop becomes the reference.
    ReZero,

    /// Move to the calibration offset.
    MoveToKnownOffset,

    /// The calibration point becomes the logical zero.
    FinalZero,

    /// Clear the kinematics history and go to the neutral orientation.
    ModelReset,

    Done,
}

#[derive(Debug, Error)]
pub enum HomingError {
    #[error("Invalid homing parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Orbita error: {0}")]
    Orbita(#[from] OrbitaError),

    #[error(
        "Calibration failed during {phase} after {elapsed_s:.2} s, disks still moving: {moving:?}"
    )]
    CalibrationFailed {
        phase: HomingPhase,
        elapsed_s: f64,
        moving: Vec<String>,
    },

    #[error("Homing cancelled during {0}")]
    Cancelled(HomingPhase),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HomingParams {
    fn default() -> Self {
        Self {
            zero_settle_s: 0.1,
            release_settle_s: 0.1,
            seek_speed: 50.0,
            seek_target: -270.0,
            seek_start_s: 1.0,
            window_size: 10,
            poll_interval_s: 0.01,
            seek_timeout_s: Some(30.0),
            stop_zero_settle_s: 1.0,
            calib_offset: 102.0,
            calib_settle_s: 2.5,
            final_zero_settle_s: 0.5,
            neutral_settle_s: 2.0,
        }
    }
}

impl HomingParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.window_size == 0 {
            return Err(ParamsError::EmptyWindow);
        }

        check_positive("poll_interval_s", self.poll_interval_s)?;
        check_positive("seek_speed", self.seek_speed)?;
        if let Some(t) = self.seek_timeout_s {
            check_positive("seek_timeout_s", t)?;
        }

        check_finite("seek_target", self.seek_target)?;
        check_finite("calib_offset", self.calib_offset)?;

        for (name, seconds) in [
            ("zero_settle_s", self.zero_settle_s),
            ("release_settle_s", self.release_settle_s),
            ("seek_start_s", self.seek_start_s),
            ("stop_zero_settle_s", self.stop_zero_settle_s),
            ("calib_settle_s", self.calib_settle_s),
            ("final_zero_settle_s", self.final_zero_settle_s),
            ("neutral_settle_s", self.neutral_settle_s),
        ]
        .iter()
        {
            check_finite(*name, *seconds)?;
        }

        Ok(())
    }
}

impl HomingPhase {
    /// The phase following this one.
    pub fn next(self) -> Self {
        use HomingPhase::*;

        match self {
            ZeroEncoders => ReleaseCompliance,
            ReleaseCompliance => SeekHardstop,
            SeekHardstop => ReZero,
            ReZero => MoveToKnownOffset,
            MoveToKnownOffset => FinalZero,
            FinalZero => ModelReset,
            ModelReset => Done,
            Done => Done,
        }
    }
}

impl fmt::Display for HomingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HomingPhase::ZeroEncoders => "ZERO_ENCODERS",
            HomingPhase::ReleaseCompliance => "RELEASE_COMPLIANCE",
            HomingPhase::SeekHardstop => "SEEK_HARDSTOP",
            HomingPhase::ReZero => "RE_ZERO",
            HomingPhase::MoveToKnownOffset => "MOVE_TO_KNOWN_OFFSET",
            HomingPhase::FinalZero => "FINAL_ZERO",
            HomingPhase::ModelReset => "MODEL_RESET",
            HomingPhase::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

impl From<DiskError> for HomingError {
    fn from(e: DiskError) -> Self {
        HomingError::Orbita(OrbitaError::Disk(e))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the homing sequence on a wrist.
///
/// Blocks until every phase has completed. On success the present position of each disk is
/// the logical zero and the wrist has been commanded to the identity orientation.
pub fn home(
    wrist: &mut OrbitaActuator,
    params: &HomingParams,
    cancel: &CancelToken,
) -> Result<HomingReport, HomingError> {
    params.are_valid()?;

    let start = Instant::now();
    let mut report = HomingReport::default();
    let mut phase = HomingPhase::ZeroEncoders;

    info!("Homing {}", wrist.name());

    while phase != HomingPhase::Done {
        if cancel.is_cancelled() {
            warn!("Homing of {} cancelled before {}", wrist.name(), phase);

            // Nothing has been commanded before the encoders are zeroed
            if phase != HomingPhase::ZeroEncoders {
                hold(wrist);
            }
            return Err(HomingError::Cancelled(phase));
        }

        info!("Homing phase {}", phase);

        match phase {
            HomingPhase::ZeroEncoders => {
                wrist.set_to_zero()?;
                pause(params.zero_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::ReleaseCompliance => {
                wrist.set_compliant(false)?;
                pause(params.release_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::SeekHardstop => {
                let (samples, duration_s) = seek_hardstop(wrist, params, cancel)?;
                report.seek_samples = samples;
                report.seek_duration_s = duration_s;
            }
            HomingPhase::ReZero => {
                wrist.set_to_zero()?;
                pause(params.stop_zero_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::MoveToKnownOffset => {
                for disk in wrist.disks().iter() {
                    disk.set_target_rot_position(params.calib_offset)?;
                }
                pause(params.calib_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::FinalZero => {
                wrist.set_to_zero()?;
                pause(params.final_zero_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::ModelReset => {
                wrist.reset_model()?;
                wrist.orient(&UnitQuaternion::identity())?;
                pause(params.neutral_settle_s, params, cancel, phase, wrist)?;
            }
            HomingPhase::Done => (),
        }

        phase = phase.next();
    }

    report.total_duration_s = start.elapsed().as_secs_f64();

    info!(
        "Homing of {} done in {:.2} s ({} seek samples)",
        wrist.name(),
        report.total_duration_s,
        report.seek_samples
    );

    Ok(report)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Drive the disks into their hard stops, returning the number of speed samples taken and the
/// time spent sampling.
fn seek_hardstop(
    wrist: &OrbitaActuator,
    params: &HomingParams,
    cancel: &CancelToken,
) -> Result<(usize, f64), HomingError> {
    const PHASE: HomingPhase = HomingPhase::SeekHardstop;

    for disk in wrist.disks().iter() {
        disk.set_target_rot_speed(params.seek_speed)?;
        disk.set_target_rot_position(params.seek_target)?;
    }

    if !cancel.sleep(params.seek_start_s, params.poll_interval_s) {
        hold(wrist);
        return Err(HomingError::Cancelled(PHASE));
    }

    let mut detector = StallDetector::new(wrist.disks().len(), params.window_size);
    let mut samples = 0;
    let t0 = Instant::now();

    loop {
        if cancel.is_cancelled() {
            hold(wrist);
            return Err(HomingError::Cancelled(PHASE));
        }

        let speeds = wrist.rot_speeds()?;
        samples += 1;

        if detector.push(&speeds) {
            break;
        }

        trace!(
            "Seek sample {}: speeds {:?}, moving {:?}",
            samples,
            speeds,
            detector.moving()
        );

        let elapsed_s = t0.elapsed().as_secs_f64();
        if params.seek_timeout_s.map_or(false, |t| elapsed_s > t) {
            hold(wrist);

            let moving = detector
                .moving()
                .into_iter()
                .map(|i| wrist.disks()[i].name().to_string())
                .collect();

            return Err(HomingError::CalibrationFailed {
                phase: PHASE,
                elapsed_s,
                moving,
            });
        }

        util::time::sleep_s(params.poll_interval_s);
    }

    Ok((samples, t0.elapsed().as_secs_f64()))
}

/// Wait for a settle duration. On cancellation the disks are held where they are.
fn pause(
    seconds: f64,
    params: &HomingParams,
    cancel: &CancelToken,
    phase: HomingPhase,
    wrist: &OrbitaActuator,
) -> Result<(), HomingError> {
    if cancel.sleep(seconds, params.poll_interval_s) {
        Ok(())
    } else {
        hold(wrist);
        Err(HomingError::Cancelled(phase))
    }
}

/// Best effort stop of an aborted homing, holding every disk where it is.
fn hold(wrist: &OrbitaActuator) {
    for disk in wrist.disks().iter() {
        let held = disk
            .present_position()
            .and_then(|p| disk.set_target_rot_position(p));

        if let Err(e) = held {
            warn!("Could not hold {} after aborted homing: {}", disk.name(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        orbita::{OrbitaConfig, NUM_DISKS},
        sim_bus::{SimBus, SimDisk},
    };
    use comms_if::{
        bus::{Bus, BusError},
        eqpt::{DiskCmd, DiskId, DiskTelemetry, ModuleId},
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    };

    const IDS: [DiskId; NUM_DISKS] = [DiskId(10), DiskId(11), DiskId(12)];

    /// Hard stops of the simulated disks, in absolute degrees.
    const STOPS: [f64; NUM_DISKS] = [-20.0, -43.0, -66.0];

    fn fast_params() -> HomingParams {
        HomingParams {
            zero_settle_s: 0.0,
            release_settle_s: 0.0,
            seek_speed: 2000.0,
            seek_start_s: 0.02,
            poll_interval_s: 0.005,
            seek_timeout_s: Some(2.0),
            stop_zero_settle_s: 0.0,
            calib_settle_s: 0.15,
            final_zero_settle_s: 0.0,
            neutral_settle_s: 0.0,
            ..HomingParams::default()
        }
    }

    fn sim_wrist(stops: [f64; NUM_DISKS]) -> (Arc<SimBus>, OrbitaActuator) {
        let mut bus = SimBus::new();
        for i in 0..NUM_DISKS {
            bus = bus.with_disk(
                IDS[i],
                SimDisk::orbita(40.0 + 37.0 * i as f64).with_stops(stops[i], std::f64::INFINITY),
            );
        }
        let bus = Arc::new(bus);

        let wrist = OrbitaActuator::new("wrist", bus.clone(), IDS, OrbitaConfig::default()).unwrap();
        (bus, wrist)
    }

    #[test]
    fn test_phase_order() {
        let mut phase = HomingPhase::ZeroEncoders;
        let mut order = vec![phase];

        while phase != HomingPhase::Done {
            phase = phase.next();
            order.push(phase);
        }

        assert_eq!(order.len(), 8);
        assert_eq!(order[2], HomingPhase::SeekHardstop);
        assert_eq!(HomingPhase::Done.next(), HomingPhase::Done);
    }

    #[test]
    fn test_home_sim() {
        let (bus, mut wrist) = sim_wrist(STOPS);

        let report = home(&mut wrist, &fast_params(), &CancelToken::new()).unwrap();
        assert!(report.seek_samples >= 10);

        for i in 0..NUM_DISKS {
            // Logical zero is the calibration offset away from the hard stop
            let abs = bus.abs_position(IDS[i]).unwrap();
            assert!((abs - (STOPS[i] + 102.0)).abs() < 1e-6, "disk {} at {}", i, abs);
            assert!(bus.raw_position(IDS[i]).unwrap().abs() < 1e-6);
            assert_eq!(bus.is_compliant(IDS[i]), Some(false));

            let cmds = bus.commands(IDS[i]);
            assert_eq!(cmds.len(), 10);
            assert_eq!(cmds[2], DiskCmd::SetToZero);
            assert_eq!(cmds[3], DiskCmd::Compliant(false));
            assert_eq!(cmds[4], DiskCmd::TargetRotSpeed(2000.0));
            assert_eq!(cmds[5], DiskCmd::TargetRotPosition(-270.0));
            assert_eq!(cmds[6], DiskCmd::SetToZero);
            assert_eq!(cmds[7], DiskCmd::TargetRotPosition(102.0));
            assert_eq!(cmds[8], DiskCmd::SetToZero);
            assert!(matches!(cmds[9], DiskCmd::TargetRotPosition(p) if p.abs() < 1e-6));
        }

        let q = wrist.orientation().unwrap();
        assert!(q.angle_to(&UnitQuaternion::identity()) < 1e-6);
    }

    #[test]
    fn test_seek_timeout() {
        let free = [std::f64::NEG_INFINITY; NUM_DISKS];
        let (bus, mut wrist) = sim_wrist(free);

        let params = HomingParams {
            seek_speed: 50.0,
            seek_timeout_s: Some(0.1),
            ..fast_params()
        };

        match home(&mut wrist, &params, &CancelToken::new()) {
            Err(HomingError::CalibrationFailed { phase, moving, .. }) => {
                assert_eq!(phase, HomingPhase::SeekHardstop);
                assert_eq!(moving.len(), NUM_DISKS);
            }
            r => panic!("Expected a calibration failure, got {:?}", r),
        }

        // The disks were told to hold
        for id in IDS.iter() {
            assert!(matches!(
                bus.commands(*id).last(),
                Some(DiskCmd::TargetRotPosition(p)) if *p > -270.0
            ));
        }
    }

    #[test]
    fn test_cancel_during_seek() {
        let free = [std::f64::NEG_INFINITY; NUM_DISKS];
        let (_bus, mut wrist) = sim_wrist(free);

        let params = HomingParams {
            seek_speed: 50.0,
            seek_timeout_s: None,
            ..fast_params()
        };

        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };

        let result = home(&mut wrist, &params, &cancel);
        canceller.join().unwrap();

        assert!(matches!(
            result,
            Err(HomingError::Cancelled(HomingPhase::SeekHardstop))
        ));
    }

    #[test]
    fn test_cancel_while_settling() {
        let (bus, mut wrist) = sim_wrist(STOPS);

        let params = HomingParams {
            calib_settle_s: 5.0,
            ..fast_params()
        };

        // Cancel as soon as the disks are sent to the calibration offset
        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            let bus = bus.clone();
            thread::spawn(move || {
                while !bus.commands(IDS[0]).contains(&DiskCmd::TargetRotPosition(102.0)) {
                    thread::sleep(Duration::from_millis(1));
                }
                cancel.cancel();
            })
        };

        let result = home(&mut wrist, &params, &cancel);
        canceller.join().unwrap();

        assert!(matches!(
            result,
            Err(HomingError::Cancelled(HomingPhase::MoveToKnownOffset))
        ));

        // Each disk is held somewhere on its way to the offset
        for id in IDS.iter() {
            let cmds = bus.commands(*id);
            assert_eq!(cmds.len(), 9);
            assert!(matches!(
                cmds[8],
                DiskCmd::TargetRotPosition(p) if p >= -1e-6 && p <= 102.0 + 1e-6
            ));
        }
    }

    #[test]
    fn test_cancel_before_start() {
        let (bus, mut wrist) = sim_wrist(STOPS);

        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            home(&mut wrist, &fast_params(), &cancel),
            Err(HomingError::Cancelled(HomingPhase::ZeroEncoders))
        ));

        // Only the configuration written by the actuator
        assert_eq!(bus.commands(IDS[0]).len(), 2);
    }

    #[test]
    fn test_transport_failure() {
        let (bus, mut wrist) = sim_wrist(STOPS);
        bus.set_connected(false);

        assert!(matches!(
            home(&mut wrist, &fast_params(), &CancelToken::new()),
            Err(HomingError::Orbita(OrbitaError::Disk(DiskError::Transport(
                BusError::NotConnected
            ))))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let (_bus, mut wrist) = sim_wrist(STOPS);
        let params = HomingParams {
            window_size: 0,
            ..fast_params()
        };

        assert!(matches!(
            home(&mut wrist, &params, &CancelToken::new()),
            Err(HomingError::InvalidParams(ParamsError::EmptyWindow))
        ));
    }

    /// Bus replaying a fixed speed profile per disk, one value per telemetry read.
    struct ScriptedBus {
        scripts: HashMap<DiskId, Vec<f64>>,
        reads: Mutex<HashMap<DiskId, usize>>,
    }

    impl Bus for ScriptedBus {
        fn send(&self, _id: DiskId, _cmd: DiskCmd) -> Result<(), BusError> {
            Ok(())
        }

        fn disk_telemetry(&self, id: DiskId) -> Result<DiskTelemetry, BusError> {
            let script = self.scripts.get(&id).ok_or(BusError::UnknownDisk(id))?;
            let mut reads = self.reads.lock().map_err(|_| BusError::Poisoned)?;
            let n = reads.entry(id).or_insert(0);

            let rot_speed = script.get(*n).copied().unwrap_or(0.0);
            *n += 1;

            Ok(DiskTelemetry {
                present_position: 0.0,
                rot_speed,
            })
        }

        fn sensor_raw(&self, id: ModuleId) -> Result<f64, BusError> {
            Err(BusError::UnknownSensor(id))
        }

        fn find_disk(&self, id: DiskId) -> Result<(), BusError> {
            self.scripts.get(&id).map(|_| ()).ok_or(BusError::UnknownDisk(id))
        }

        fn find_module(&self, name: &str) -> Result<ModuleId, BusError> {
            Err(BusError::UnknownModule(name.into()))
        }
    }

    fn scripted_home(scripts: [Vec<f64>; NUM_DISKS]) -> HomingReport {
        let mut map = HashMap::new();
        for (id, script) in IDS.iter().zip(scripts.iter()) {
            map.insert(*id, script.clone());
        }
        let bus = Arc::new(ScriptedBus {
            scripts: map,
            reads: Mutex::new(HashMap::new()),
        });

        let mut wrist = OrbitaActuator::new("wrist", bus, IDS, OrbitaConfig::default()).unwrap();
        let params = HomingParams {
            seek_start_s: 0.0,
            calib_settle_s: 0.0,
            poll_interval_s: 0.001,
            ..fast_params()
        };

        home(&mut wrist, &params, &CancelToken::new()).unwrap()
    }

    fn profile(moving: usize) -> Vec<f64> {
        (0..moving).map(|_| -50.0).collect()
    }

    #[test]
    fn test_seek_waits_for_slowest_disk() {
        // Disks stall after 15, 20 and 12 samples, the last needs 10 samples at rest
        let report = scripted_home([profile(15), profile(20), profile(12)]);
        assert_eq!(report.seek_samples, 30);
    }

    #[test]
    fn test_seek_ignores_single_spike() {
        let mut noisy = profile(20);
        noisy.extend_from_slice(&[0.0, 0.0, 0.0, 0.0, 0.0, 40.0]);

        let report = scripted_home([profile(15), noisy, profile(12)]);
        assert_eq!(report.seek_samples, 30);
    }

    #[test]
    fn test_seek_needs_full_window() {
        // Every disk is at rest from the first sample
        let report = scripted_home([vec![], vec![], vec![]]);
        assert_eq!(report.seek_samples, 10);
    }
}
