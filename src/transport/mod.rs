//! Transport layer for device connectivity
//!
//! This module provides the transport abstraction the connection supervisor
//! drives (network link plus messaging session) and its MQTT implementation.

use crate::config::Credentials;
use serde::{Deserialize, Serialize};

pub mod mqtt;

/// Quality of service negotiated per publish/subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("QoS must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Liveness of the network link or the messaging session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Up,
    Down,
}

impl Liveness {
    pub fn is_up(self) -> bool {
        matches!(self, Liveness::Up)
    }
}

/// Message the broker publishes on our behalf if the session dies uncleanly
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Everything needed for one session establishment attempt
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Client identity, unique per attempt
    pub client_id: String,
    pub credentials: Option<Credentials>,
    pub last_will: LastWill,
}

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport contract consumed by the connection supervisor
///
/// Status accessors are authoritative: the supervisor re-queries them at the
/// top of every tick instead of inferring liveness from publish results.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current network link status
    fn link_status(&self) -> Liveness;

    /// Attempt to bring the link up; bounded by the transport's own timeout
    async fn begin_link(&mut self) -> Result<(), Self::Error>;

    /// Current messaging session status
    fn session_status(&self) -> Liveness;

    /// Attempt to establish a session with the given identity and last will
    async fn begin_session(&mut self, params: &SessionParams) -> Result<(), Self::Error>;

    /// Hand a message to the session; `Ok` means accepted, not delivered
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Subscribe to an inbound topic
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Drive protocol keep-alive and return the next queued inbound message
    async fn pump_inbound(&mut self) -> Option<InboundMessage>;

    /// Hardware address used to derive a stable device identity
    fn identity_mac_address(&self) -> String;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
