//! MQTT implementation of the device transport
//!
//! The module is split the same way as the rest of the transport layer:
//! pure configuration and event routing kept apart from the I/O.
//!
//! - [`connection`] - Pure option building and the transport error type
//! - [`message_handler`] - Pure event routing and error classification
//! - [`client`] - Impure I/O: name resolution, rumqttc client and event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensor_agent::config::NodeConfig;
//! use sensor_agent::transport::mqtt::MqttClient;
//! use sensor_agent::transport::Transport;
//!
//! # tokio_test::block_on(async {
//! let config = NodeConfig::from_toml_str(r#"
//! [mqtt]
//! broker_url = "mqtt://localhost:1883"
//! "#)?;
//!
//! let mut client = MqttClient::new(&config)?;
//! client.begin_link().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttClient;
pub use connection::{configure_mqtt_options, MqttError};
pub use message_handler::{EventRoute, FailureScope, MessageHandler};
