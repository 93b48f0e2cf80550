//! # Hand executable parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Top level parameters of `hand_exec`, read from `hand_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandExecParams {
    /// Parameter file describing the hand attached to this executable, relative to the params
    /// directory.
    pub hand_params_file: String,

    /// Endpoint of the bus gateway.
    pub bus_endpoint: String,

    /// Timeout for a single bus request.
    ///
    /// Units: milliseconds
    pub bus_timeout_ms: i32,

    /// Endpoint the hand server binds to.
    pub server_endpoint: String,

    /// Run the simulated bus rather than connecting to the gateway.
    #[serde(default)]
    pub simulate: bool,

    /// Run the homing sequence at startup, for hands which support it.
    #[serde(default = "default_true")]
    pub home_on_start: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("{0} must be positive and finite, found {1}")]
    NotPositive(&'static str, f64),

    #[error("{0} must be finite, found {1}")]
    NotFinite(&'static str, f64),

    #[error("R0 is not a proper rotation matrix")]
    ImproperRotation,

    #[error("Pc_z and Cp_z coincide, the platform tilt cannot be observed")]
    DegenerateGeometry,

    #[error("Not all disks have a unique id")]
    NonUniqueDiskIds,

    #[error("No motor named {0}")]
    MissingMotor(String),

    #[error("The homing speed window must hold at least one sample")]
    EmptyWindow,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check that a parameter is a positive finite number.
pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamsError::NotPositive(name, value))
    }
}

/// Check that a parameter is finite.
pub(crate) fn check_finite(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParamsError::NotFinite(name, value))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exec_params() {
        let params: HandExecParams = util::params::from_str(
            r#"
            hand_params_file = "force_gripper.toml"
            bus_endpoint = "tcp://localhost:5100"
            bus_timeout_ms = 500
            server_endpoint = "tcp://*:5110"
            "#,
        )
        .unwrap();

        assert!(!params.simulate);
        assert!(params.home_on_start);
        assert_eq!(params.hand_params_file, "force_gripper.toml");
    }

    #[test]
    fn test_checks() {
        assert!(check_positive("R", 36.7).is_ok());
        assert!(matches!(check_positive("R", 0.0), Err(ParamsError::NotPositive("R", _))));
        assert!(check_positive("R", std::f64::NAN).is_err());
        assert!(check_finite("offset", -3.0).is_ok());
        assert!(check_finite("offset", std::f64::INFINITY).is_err());
    }
}
