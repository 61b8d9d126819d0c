//! Observability for the sensor agent
//!
//! Structured logging only: every state change and reading is a `tracing`
//! event with named fields, rendered as JSON or for a terminal.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{connection_span, mqtt_span, sensor_span};
