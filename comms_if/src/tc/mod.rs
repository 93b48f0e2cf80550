//! # Hand command module
//!
//! Commands accepted by the hand executable, either from the command line or from the network
//! through the hand server.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod hand;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use hand::*;
