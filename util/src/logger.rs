//! Logging to the terminal and to the session log file

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{self, info, Level, Record};
use colored::{ColoredString, Colorize};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Levels of the two log outputs.
///
/// The log file keeps everything down to `file`, while the terminal is
/// usually kept quieter so that high rate traces (bus traffic, position
/// tracking) don't drown the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    pub console: LevelFilter,
    pub file: LevelFilter,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected the {0} log level to be at least `INFO`, found `{1}`")]
    InvalidMinLogLevel(&'static str, log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LogLevels {
    fn default() -> Self {
        Self {
            console: LevelFilter::Info,
            file: LevelFilter::Trace
        }
    }
}

impl LogLevels {
    /// Same level on both outputs.
    pub fn all(level: LevelFilter) -> Self {
        Self {
            console: level,
            file: level
        }
    }

    /// Phase and fault messages of the control routines must reach both
    /// outputs.
    pub fn check(&self) -> Result<(), LoggerInitError> {
        if self.console < Level::Info {
            return Err(LoggerInitError::InvalidMinLogLevel("console", self.console))
        }
        if self.file < Level::Info {
            return Err(LoggerInitError::InvalidMinLogLevel("file", self.file))
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    levels: LogLevels,
    session: &session::Session
) -> Result<(), LoggerInitError> {

    levels.check()?;

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let console = fern::Dispatch::new()
        .level(levels.console)
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .level(levels.file)
        .chain(log_file);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(session::get_elapsed_seconds(), record, message)
            ))
        })
        .level(levels.console.max(levels.file))
        .level_for("zmq", LevelFilter::Info)
        .chain(console)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Console level: {:?}", levels.console);
    info!("    File level: {:?}", levels.file);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build one log line. Debug and trace lines carry their target.
fn format_line(
    elapsed_s: f64,
    record: &Record,
    message: &std::fmt::Arguments
) -> String {
    if record.level() > Level::Info {
        format!(
            "[{:10.6} {}] {}: {}",
            elapsed_s,
            level_to_str(record.level()),
            record.target(),
            message
        )
    }
    else {
        format!(
            "[{:10.6} {}] {}",
            elapsed_s,
            level_to_str(record.level()),
            message
        )
    }
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_levels() {
        assert!(LogLevels::default().check().is_ok());
        assert!(LogLevels::all(LevelFilter::Info).check().is_ok());

        assert!(matches!(
            LogLevels::all(LevelFilter::Warn).check(),
            Err(LoggerInitError::InvalidMinLogLevel("console", LevelFilter::Warn))
        ));
        assert!(matches!(
            LogLevels { console: LevelFilter::Debug, file: LevelFilter::Off }.check(),
            Err(LoggerInitError::InvalidMinLogLevel("file", LevelFilter::Off))
        ));
    }

    #[test]
    fn test_format_line() {
        colored::control::set_override(false);

        let line = format_line(
            1.5,
            &Record::builder()
                .level(Level::Info)
                .target("hand_lib::homing")
                .args(format_args!("x"))
                .build(),
            &format_args!("Homing phase {}", "SeekHardstop")
        );
        assert_eq!(line, "[  1.500000 INF] Homing phase SeekHardstop");

        let line = format_line(
            0.25,
            &Record::builder()
                .level(Level::Trace)
                .target("hand_lib::orbita")
                .args(format_args!("x"))
                .build(),
            &format_args!("sample")
        );
        assert_eq!(line, "[  0.250000 TRC] hand_lib::orbita: sample");
    }
}
