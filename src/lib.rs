//! Sensor Agent - temperature/humidity telemetry over MQTT
//!
//! A long-running agent that samples a DHT11-class sensor, publishes readings
//! only when they change meaningfully, and keeps its network link and broker
//! session alive on its own.
//!
//! # Overview
//!
//! - [`node::ConnectionSupervisor`] owns link/session liveness and reconnection
//! - [`node::PublicationScheduler`] runs the cooperative control loop
//! - [`node::ChangeFilter`] suppresses publishes for insignificant changes
//! - [`transport`] defines the transport contract and its MQTT implementation
//! - [`sensor`] and [`indicator`] are the hardware-facing collaborators
//!
//! # Quick Start
//!
//! ```rust
//! use sensor_agent::config::ThresholdsSection;
//! use sensor_agent::node::ChangeFilter;
//! use sensor_agent::sensor::Reading;
//! use tokio::time::Instant;
//!
//! let mut filter = ChangeFilter::new(ThresholdsSection::default());
//! let first = Reading::new(20.0, 50.0, Instant::now()).unwrap();
//! assert!(filter.should_publish(&first));
//! filter.record_published(first);
//!
//! let next = Reading::new(20.3, 50.0, Instant::now()).unwrap();
//! assert!(!filter.should_publish(&next));
//! ```

pub mod config;
pub mod error;
pub mod indicator;
pub mod node;
pub mod observability;
pub mod protocol;
pub mod sensor;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use node::{ConnectionState, ConnectionSupervisor, PublicationScheduler, RunOutcome};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
