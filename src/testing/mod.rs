//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the sensor agent
//! without an MQTT broker, a network link or sensor hardware.

use crate::config::{
    DeviceSection, IndicatorSection, IntervalsSection, MqttSection, NetworkSection, NodeConfig,
    RetryPolicy, SensorSection, ThresholdsSection, TopicsSection,
};

pub mod mocks;

pub use mocks::*;

/// Default configuration with a fixed device id and a local broker
pub fn test_node_config() -> NodeConfig {
    NodeConfig {
        device: DeviceSection {
            id: Some("test-device".to_string()),
            ..DeviceSection::default()
        },
        network: NetworkSection::default(),
        mqtt: MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            session_retry: RetryPolicy::session_default(),
            inbound_capacity: 10,
        },
        topics: TopicsSection::default(),
        intervals: IntervalsSection::default(),
        thresholds: ThresholdsSection::default(),
        sensor: SensorSection::default(),
        indicator: IndicatorSection::default(),
    }
}
