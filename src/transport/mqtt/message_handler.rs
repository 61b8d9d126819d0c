//! Pure event routing for the MQTT transport
//!
//! This module contains pure functions that classify rumqttc events and
//! connection errors so the client can update link/session liveness.

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{ConnectionError, Event};
use tracing::debug;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if connack.code == ConnectReturnCode::Success {
                        EventRoute::ConnectionAcknowledged
                    } else {
                        EventRoute::ConnectionRejected(format!("{:?}", connack.code))
                    }
                }
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Decide which layer an event loop error takes down on an established
    /// session (pure function)
    ///
    /// Socket-level failures mean the link itself is gone; protocol state,
    /// refused ConnAck and TLS errors only end the session.
    pub fn classify_connection_error(error: &ConnectionError) -> FailureScope {
        match error {
            ConnectionError::Io(_) | ConnectionError::Timeout(_) => FailureScope::Link,
            _ => FailureScope::Session,
        }
    }

    /// Scope of a failure while a session is still being negotiated
    ///
    /// The link was just verified, so a broker that refuses the socket or
    /// never answers is a session problem.
    pub fn classify_session_attempt_error(_error: &ConnectionError) -> FailureScope {
        FailureScope::Session
    }

    /// Determine if an inbound message should be queued for the node (pure function)
    pub fn should_queue_message(topic: &str, subscribed: &[String]) -> bool {
        if subscribed.iter().any(|s| s == topic) {
            true
        } else {
            debug!("Dropping message on unsubscribed topic: {}", topic);
            false
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Broker answered the connect with a failure code
    ConnectionRejected(String),
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// MQTT broker disconnected
    Disconnected,
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Which layer an error invalidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Link,
    Session,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, Disconnect, DisconnectReasonCode, Publish};
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        );

        let refused = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::ConnectionRejected(_)
        ));
    }

    #[test]
    fn test_route_disconnect() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&disconnect),
            EventRoute::Disconnected
        );
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from("esp32/command"),
            pkid: 1,
            payload: Bytes::from("restart"),
            properties: None,
        }));

        assert_eq!(
            MessageHandler::route_mqtt_event(&publish),
            EventRoute::MessageReceived {
                topic: "esp32/command".to_string(),
                payload: b"restart".to_vec(),
                retain: false,
            }
        );
    }

    #[test]
    fn test_classify_connection_error() {
        let io = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(
            MessageHandler::classify_connection_error(&io),
            FailureScope::Link
        );
        assert_eq!(
            MessageHandler::classify_connection_error(&ConnectionError::RequestsDone),
            FailureScope::Session
        );
    }

    #[tokio::test]
    async fn test_classify_network_timeout_as_link() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::ZERO,
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            MessageHandler::classify_connection_error(&ConnectionError::Timeout(elapsed)),
            FailureScope::Link
        );
    }

    #[test]
    fn test_session_attempt_errors_never_demote_link() {
        let refused = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(
            MessageHandler::classify_session_attempt_error(&refused),
            FailureScope::Session
        );
        assert_eq!(
            MessageHandler::classify_session_attempt_error(&ConnectionError::RequestsDone),
            FailureScope::Session
        );
    }

    #[test]
    fn test_should_queue_message() {
        let subscribed = vec!["esp32/command".to_string()];
        assert!(MessageHandler::should_queue_message(
            "esp32/command",
            &subscribed
        ));
        assert!(!MessageHandler::should_queue_message(
            "esp32/other",
            &subscribed
        ));
    }
}
