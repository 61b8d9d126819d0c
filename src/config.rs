//! Startup configuration for the sensor agent
//!
//! Everything here is read once from a TOML file at startup and never mutated
//! afterwards. Credentials are never stored in the file: the MQTT section names
//! the environment variables that hold them.

use crate::transport::QoS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub network: NetworkSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub topics: TopicsSection,
    #[serde(default)]
    pub intervals: IntervalsSection,
    #[serde(default)]
    pub thresholds: ThresholdsSection,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub indicator: IndicatorSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Fixed device identifier; derived from the MAC address when absent
    pub id: Option<String>,
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Sensor identity carried in every reading payload
    #[serde(default = "default_sensor_model")]
    pub sensor_model: String,
    /// Prefix of the per-attempt MQTT client id
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: None,
            name: default_device_name(),
            sensor_model: default_sensor_model(),
            client_id_prefix: default_client_id_prefix(),
        }
    }
}

fn default_device_name() -> String {
    "ESP32 DHT11 Monitor".to_string()
}

fn default_sensor_model() -> String {
    "DHT11".to_string()
}

fn default_client_id_prefix() -> String {
    "ESP32-DHT11".to_string()
}

/// Network link section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Upper bound on a single link establishment attempt
    #[serde(default = "default_link_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "RetryPolicy::link_default")]
    pub retry: RetryPolicy,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_link_timeout(),
            retry: RetryPolicy::link_default(),
        }
    }
}

fn default_link_timeout() -> u64 {
    20
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Upper bound on waiting for ConnAck during a session attempt
    #[serde(default = "default_session_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "RetryPolicy::session_default")]
    pub session_retry: RetryPolicy,
    /// Capacity of the client request queue
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

fn default_keep_alive() -> u64 {
    60
}

fn default_session_timeout() -> u64 {
    10
}

fn default_inbound_capacity() -> usize {
    10
}

/// Delay schedule between failed connection attempts.
///
/// Attempts are unlimited: once the pattern is exhausted every further attempt
/// waits `sustained_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Delays in milliseconds for the first attempts
    #[serde(default)]
    pub backoff_pattern_ms: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay_ms: u64,
}

impl RetryPolicy {
    /// Link retries: quick first retries, then settle at 10s
    pub fn link_default() -> Self {
        Self {
            backoff_pattern_ms: vec![500, 1000, 2000, 5000],
            sustained_delay_ms: 10_000,
        }
    }

    /// Session retries: a flat 5s between broker connection attempts
    pub fn session_default() -> Self {
        Self {
            backoff_pattern_ms: Vec::new(),
            sustained_delay_ms: 5_000,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern_ms
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay_ms);
        Duration::from_millis(millis)
    }
}

/// A single outbound channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: QoS,
    #[serde(default)]
    pub retain: bool,
}

impl ChannelConfig {
    fn new(topic: &str, retain: bool) -> Self {
        Self {
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            retain,
        }
    }
}

fn default_qos() -> QoS {
    QoS::AtLeastOnce
}

/// Topic layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    #[serde(default = "default_temperature_channel")]
    pub temperature: ChannelConfig,
    #[serde(default = "default_humidity_channel")]
    pub humidity: ChannelConfig,
    /// Status channel, also used for the last-will message
    #[serde(default = "default_status_channel")]
    pub status: ChannelConfig,
    #[serde(default = "default_heartbeat_channel")]
    pub heartbeat: ChannelConfig,
    /// Inbound command topic, subscribed on every session
    #[serde(default = "default_command_topic")]
    pub command: String,
}

impl Default for TopicsSection {
    fn default() -> Self {
        Self {
            temperature: default_temperature_channel(),
            humidity: default_humidity_channel(),
            status: default_status_channel(),
            heartbeat: default_heartbeat_channel(),
            command: default_command_topic(),
        }
    }
}

fn default_temperature_channel() -> ChannelConfig {
    ChannelConfig::new("esp32/dht11/temperature", false)
}

fn default_humidity_channel() -> ChannelConfig {
    ChannelConfig::new("esp32/dht11/humidity", false)
}

fn default_status_channel() -> ChannelConfig {
    ChannelConfig::new("esp32/status", true)
}

fn default_heartbeat_channel() -> ChannelConfig {
    ChannelConfig::new("esp32/heartbeat", false)
}

fn default_command_topic() -> String {
    "esp32/command".to_string()
}

/// Timer periods and loop pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntervalsSection {
    #[serde(default = "default_sample_secs")]
    pub sample_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_status_secs")]
    pub status_secs: u64,
    /// Idle delay between loop iterations
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// Delay between receiving `restart` and restarting
    #[serde(default = "default_restart_grace_secs")]
    pub restart_grace_secs: u64,
}

impl Default for IntervalsSection {
    fn default() -> Self {
        Self {
            sample_secs: default_sample_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            status_secs: default_status_secs(),
            idle_delay_ms: default_idle_delay_ms(),
            restart_grace_secs: default_restart_grace_secs(),
        }
    }
}

impl IntervalsSection {
    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(self.sample_secs)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_secs(self.status_secs)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }
}

fn default_sample_secs() -> u64 {
    10
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_status_secs() -> u64 {
    300
}

fn default_idle_delay_ms() -> u64 {
    100
}

fn default_restart_grace_secs() -> u64 {
    3
}

/// Minimum change, against the last published reading, that warrants publishing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdsSection {
    #[serde(default = "default_temperature_delta")]
    pub temperature_delta: f64,
    #[serde(default = "default_humidity_delta")]
    pub humidity_delta: f64,
}

impl Default for ThresholdsSection {
    fn default() -> Self {
        Self {
            temperature_delta: default_temperature_delta(),
            humidity_delta: default_humidity_delta(),
        }
    }
}

fn default_temperature_delta() -> f64 {
    0.5
}

fn default_humidity_delta() -> f64 {
    2.0
}

/// Sensor backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SensorSection {
    /// Seeded random walk, for hosts without a sensor attached
    Simulated {
        seed: Option<u64>,
        #[serde(default = "default_fault_rate")]
        fault_rate: f64,
        #[serde(default = "default_base_temperature")]
        base_temperature: f64,
        #[serde(default = "default_base_humidity")]
        base_humidity: f64,
    },
    /// Linux IIO dht11 driver
    Iio { device_path: String },
}

impl Default for SensorSection {
    fn default() -> Self {
        SensorSection::Simulated {
            seed: None,
            fault_rate: default_fault_rate(),
            base_temperature: default_base_temperature(),
            base_humidity: default_base_humidity(),
        }
    }
}

fn default_fault_rate() -> f64 {
    0.05
}

fn default_base_temperature() -> f64 {
    21.0
}

fn default_base_humidity() -> f64 {
    50.0
}

/// Indicator backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndicatorSection {
    #[default]
    Log,
    /// sysfs LED, e.g. `/sys/class/leds/led0/brightness`
    Led { brightness_path: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No configuration file found; provide one with -c/--config or create {0}")]
    NotFound(String),
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Broker address extracted from `broker_url`
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl MqttSection {
    /// Parse the broker URL; `mqtt://` defaults to 1883, `mqtts://` to 8883
    pub fn broker_address(&self) -> Result<BrokerAddress, ConfigError> {
        let url = Url::parse(&self.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.broker_url.clone()))?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            _ => return Err(ConfigError::InvalidBrokerUrl(self.broker_url.clone())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidBrokerUrl(self.broker_url.clone()))?;
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// Resolve credentials from the environment; username is required for a pair
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self
            .username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|u| !u.is_empty())?;
        let password = self
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Some(Credentials { username, password })
    }
}

/// Broker credentials resolved at session time
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = &self.device.id {
            validate_device_id(id)?;
        }
        validate_device_id(&self.device.client_id_prefix)?;

        self.mqtt.broker_address()?;

        let intervals = [
            ("sample_secs", self.intervals.sample_secs),
            ("heartbeat_secs", self.intervals.heartbeat_secs),
            ("status_secs", self.intervals.status_secs),
            ("network.connect_timeout_secs", self.network.connect_timeout_secs),
            ("mqtt.connect_timeout_secs", self.mqtt.connect_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        for (name, value) in [
            ("temperature_delta", self.thresholds.temperature_delta),
            ("humidity_delta", self.thresholds.humidity_delta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        for (name, policy) in [
            ("network.retry", &self.network.retry),
            ("mqtt.session_retry", &self.mqtt.session_retry),
        ] {
            if policy.sustained_delay_ms == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name}.sustained_delay_ms must be greater than 0"
                )));
            }
        }

        if self.mqtt.inbound_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.inbound_capacity must be greater than 0".to_string(),
            ));
        }

        if self.topics.command.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "topics.command must not be empty".to_string(),
            ));
        }

        if let SensorSection::Simulated {
            fault_rate,
            base_temperature,
            base_humidity,
            ..
        } = &self.sensor
        {
            if !(0.0..=1.0).contains(fault_rate) {
                return Err(ConfigError::InvalidConfig(format!(
                    "sensor.fault_rate must be within 0.0..=1.0, got {fault_rate}"
                )));
            }
            for (name, value) in [
                ("base_temperature", base_temperature),
                ("base_humidity", base_humidity),
            ] {
                if !value.is_finite() {
                    return Err(ConfigError::InvalidConfig(format!(
                        "sensor.{name} must be a finite number, got {value}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
id = "test-device"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Device IDs and client id prefixes must match `[a-zA-Z0-9._-]+`
fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_device_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
[mqtt]
broker_url = "mqtt://broker.hivemq.com:1883"
"#,
        )
        .unwrap();

        assert_eq!(config.device.id, None);
        assert_eq!(config.device.client_id_prefix, "ESP32-DHT11");
        assert_eq!(config.topics.temperature.topic, "esp32/dht11/temperature");
        assert_eq!(config.topics.humidity.topic, "esp32/dht11/humidity");
        assert_eq!(config.topics.status.topic, "esp32/status");
        assert!(config.topics.status.retain);
        assert!(!config.topics.heartbeat.retain);
        assert_eq!(config.topics.command, "esp32/command");
        assert_eq!(config.intervals.sample_period(), Duration::from_secs(10));
        assert_eq!(config.intervals.heartbeat_period(), Duration::from_secs(60));
        assert_eq!(config.intervals.status_period(), Duration::from_secs(300));
        assert_eq!(config.intervals.idle_delay(), Duration::from_millis(100));
        assert_eq!(config.thresholds.temperature_delta, 0.5);
        assert_eq!(config.thresholds.humidity_delta, 2.0);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
    }

    #[test]
    fn test_session_retry_is_flat_five_seconds() {
        let policy = RetryPolicy::session_default();
        assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(100), Duration::from_secs(5));
    }

    #[test]
    fn test_link_retry_follows_pattern_then_sustains() {
        let policy = RetryPolicy::link_default();
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after_attempt(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_after_attempt(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_after_attempt(50), Duration::from_millis(10_000));
    }

    #[test]
    fn test_broker_address_default_ports() {
        let mut section = NodeConfig::test_config().mqtt;

        section.broker_url = "mqtt://broker.local".to_string();
        let address = section.broker_address().unwrap();
        assert_eq!(address.port, 1883);
        assert!(!address.tls);

        section.broker_url = "mqtts://broker.local".to_string();
        let address = section.broker_address().unwrap();
        assert_eq!(address.port, 8883);
        assert!(address.tls);
    }

    #[test]
    fn test_invalid_broker_url_rejected() {
        let mut section = NodeConfig::test_config().mqtt;
        section.broker_url = "http://broker.local".to_string();
        assert!(matches!(
            section.broker_address(),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));

        section.broker_url = "not a url".to_string();
        assert!(matches!(
            section.broker_address(),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_invalid_device_id_rejected() {
        let mut config = NodeConfig::test_config();
        config.device.id = Some("bad id!".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDeviceId(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = NodeConfig::test_config();
        config.intervals.sample_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut config = NodeConfig::test_config();
        config.thresholds.humidity_delta = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_masked_in_debug() {
        let credentials = Credentials {
            username: "device".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("device"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_credentials_absent_without_username_env() {
        let config = NodeConfig::test_config();
        assert!(config.mqtt.credentials().is_none());
    }
}
