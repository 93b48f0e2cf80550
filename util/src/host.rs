//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable pointing at the root of the software tree.
pub const SW_ROOT_ENV_VAR: &str = "HAND_SW_ROOT";

/// Get the root directory of the software tree.
///
/// This is read from the `HAND_SW_ROOT` environment variable, which must be
/// set before any session is started or any parameters are loaded.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
