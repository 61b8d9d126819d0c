//! Wire formats for the sensor agent
//!
//! Outbound JSON payloads and the inbound command vocabulary.

pub mod commands;
pub mod messages;

pub use commands::*;
pub use messages::*;
