//! Error taxonomy for the sensor agent
//!
//! Only configuration errors are fatal, and only at startup. Every other
//! variant is recovered where it occurs: connection failures by the
//! supervisor's retry schedule, sensor faults by skipping the cycle, rejected
//! publishes and unknown commands by logging them.

use crate::sensor::SensorError;
use thiserror::Error;

/// Main error type for sensor agent operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Link failure: {message}")]
    LinkFailure { message: String },

    #[error("Session failure: {message}")]
    SessionFailure { message: String },

    #[error("Sensor fault: {0}")]
    SensorFault(#[from] SensorError),

    #[error("Publish rejected on {topic}: {message}")]
    PublishRejected { topic: String, message: String },

    #[error("Unrecognized command: {name}")]
    UnrecognizedCommand { name: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Restart failed: {0}")]
    RestartFailed(#[source] std::io::Error),
}

impl NodeError {
    /// Create link failure error
    pub fn link_failure<E: std::fmt::Display>(error: E) -> Self {
        Self::LinkFailure {
            message: error.to_string(),
        }
    }

    /// Create session failure error
    pub fn session_failure<E: std::fmt::Display>(error: E) -> Self {
        Self::SessionFailure {
            message: error.to_string(),
        }
    }

    /// Create publish rejected error
    pub fn publish_rejected<E: std::fmt::Display>(topic: &str, error: E) -> Self {
        Self::PublishRejected {
            topic: topic.to_string(),
            message: error.to_string(),
        }
    }

    /// Whether the error is a startup failure rather than a runtime one
    ///
    /// Runtime errors never leave the control loop; a failed restart is the
    /// only one that reaches `main` besides configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::ConfigError(_))
    }
}

/// Result type for sensor agent operations
pub type NodeResult<T> = Result<T, NodeError>;
