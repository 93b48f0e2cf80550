//! # Hand Control Executable
//!
//! This executable is responsible for controlling one hand of the robot:
//! - Force gripper: wrist pitch and roll motors, the gripper and its load sensor
//! - Orbita wrist: the three disks of the parallel wrist
//!
//! At startup the hand is built from its parameter file and homed if it needs to be. A single
//! command given on the command line is then executed, otherwise the executable serves commands
//! received from the network until it is killed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::sync::Arc;

use color_eyre::{eyre::WrapErr, Result};
use comms_if::{
    bus::{BusError, BusPool, SharedBus},
    net::{zmq, ZmqBus},
    tc::{HandCmd, HandResponse},
};
use log::{info, trace, warn};
use structopt::StructOpt;

// Internal
use hand_lib::{
    hand::{Hand, HandParams},
    hand_server::HandServer,
    params::HandExecParams,
    sim_bus::SimBus,
};
use util::{
    cancel::CancelToken,
    logger::{logger_init, LevelFilter, LogLevels},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "hand_exec", about = "Hand actuator control executable")]
struct Opts {
    /// Run against the in-process simulated bus
    #[structopt(long)]
    sim: bool,

    /// Skip the homing sequence at startup
    #[structopt(long)]
    no_home: bool,

    /// Also print debug and trace messages to the terminal
    #[structopt(short, long)]
    verbose: bool,

    /// Executable parameter file, relative to the params directory
    #[structopt(long, default_value = "hand_exec.toml")]
    params: String,

    /// Execute a single command and exit instead of serving commands
    #[structopt(subcommand)]
    cmd: Option<HandCmd>,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("hand_exec", "sessions").wrap_err("Failed to create the session")?;

    let levels = if opts.verbose {
        LogLevels::all(LevelFilter::Trace)
    } else {
        LogLevels::default()
    };
    logger_init(levels, &session).wrap_err("Failed to initialise logging")?;

    info!("Hand Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: HandExecParams = util::params::load(&opts.params)
        .wrap_err_with(|| format!("Could not load {}", opts.params))?;

    let hand_params: HandParams = util::params::load(&params.hand_params_file)
        .wrap_err_with(|| format!("Could not load {}", params.hand_params_file))?;

    info!("Parameters loaded");

    // ---- BUS AND HAND INITIALISATION ----

    let ctx = zmq::Context::new();
    let mut pool = BusPool::new();

    let bus: SharedBus = if opts.sim || params.simulate {
        info!("Using the simulated bus");
        Arc::new(SimBus::for_hand(&hand_params))
    } else {
        pool.get_or_open(&params.bus_endpoint, |endpoint| {
            let bus = ZmqBus::connect(&ctx, endpoint, params.bus_timeout_ms)
                .map_err(|e| BusError::SendError(format!("Could not connect: {}", e)))?;
            Ok(Arc::new(bus) as SharedBus)
        })
        .wrap_err("Failed to open the bus")?
    };

    let mut hand = Hand::new(bus, &hand_params).wrap_err("Failed to initialise the hand")?;

    info!("Hand {} initialised", hand.name());

    // Commands are served one at a time and always run to completion, nothing raises this token
    let cancel = CancelToken::new();

    if hand.needs_homing() && params.home_on_start && !opts.no_home {
        hand.execute(&HandCmd::Home, &cancel)
            .wrap_err("Failed to home the hand")?;
    }

    // ---- SINGLE COMMAND ----

    if let Some(cmd) = opts.cmd {
        let response = hand
            .execute(&cmd, &cancel)
            .wrap_err_with(|| format!("Failed to execute {:?}", cmd))?;

        info!("{:?}", response);
        return Ok(());
    }

    // ---- MAIN LOOP ----

    let mut server = HandServer::new(&ctx, &params).wrap_err("Failed to initialise the server")?;

    info!("Initialisation complete, serving commands on {}", params.server_endpoint);

    loop {
        let cmd = match server.get_cmd() {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                warn!("Could not get a command: {}", e);
                continue;
            }
        };

        trace!("Recieved {:?}", cmd);

        let response = match hand.execute(&cmd, &cancel) {
            Ok(r) => r,
            Err(e) => {
                warn!("{:?} failed: {}", cmd, e);
                HandResponse::Error(e.to_string())
            }
        };

        if let Err(e) = server.send_response(&response) {
            warn!("Couldn't send the response to the client: {}", e);
        }
    }
}
