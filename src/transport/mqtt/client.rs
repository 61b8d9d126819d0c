//! Impure I/O operations for the MQTT transport
//!
//! This module handles name resolution, the rumqttc client and event loop,
//! and the bookkeeping that keeps link/session liveness honest.

use super::connection::{configure_mqtt_options, to_rumqttc_qos, MqttError};
use super::message_handler::{EventRoute, FailureScope, MessageHandler};
use crate::config::{BrokerAddress, ConfigError, NodeConfig};
use crate::transport::{InboundMessage, Liveness, QoS, SessionParams, Transport};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a single pump waits on the event loop before yielding
const PUMP_POLL_WINDOW: Duration = Duration::from_millis(5);

/// Event loop iterations per pump, so a busy broker cannot starve the tick
const MAX_EVENTS_PER_PUMP: usize = 32;

/// MQTT transport over rumqttc
pub struct MqttClient {
    broker: BrokerAddress,
    link_timeout: Duration,
    connect_timeout: Duration,
    keep_alive: Duration,
    request_capacity: usize,
    link: Liveness,
    session: Liveness,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoop>,
    subscribed_topics: Vec<String>,
    inbound: VecDeque<InboundMessage>,
}

impl MqttClient {
    pub fn new(config: &NodeConfig) -> Result<Self, ConfigError> {
        Ok(MqttClient {
            broker: config.mqtt.broker_address()?,
            link_timeout: Duration::from_secs(config.network.connect_timeout_secs),
            connect_timeout: Duration::from_secs(config.mqtt.connect_timeout_secs),
            keep_alive: Duration::from_secs(config.mqtt.keep_alive_secs),
            request_capacity: config.mqtt.inbound_capacity,
            link: Liveness::Down,
            session: Liveness::Down,
            client: None,
            event_loop: None,
            subscribed_topics: Vec::new(),
            inbound: VecDeque::new(),
        })
    }

    /// Drop the current session; the broker will fire our last will
    fn drop_session(&mut self, reason: &str) {
        if self.session.is_up() {
            warn!("MQTT session lost: {}", reason);
        }
        self.session = Liveness::Down;
        self.client = None;
        self.event_loop = None;
        self.subscribed_topics.clear();
    }

    fn apply_failure(&mut self, scope: FailureScope, reason: &str) {
        if scope == FailureScope::Link {
            if self.link.is_up() {
                warn!("Network link lost: {}", reason);
            }
            self.link = Liveness::Down;
        }
        self.drop_session(reason);
    }

    /// Apply a routed event to the client state
    fn process_event_route(&mut self, route: EventRoute) {
        match route {
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                if retain {
                    debug!("Ignoring retained message on topic: {}", topic);
                } else if MessageHandler::should_queue_message(&topic, &self.subscribed_topics) {
                    self.inbound.push_back(InboundMessage { topic, payload });
                }
            }
            EventRoute::Disconnected => self.drop_session("broker disconnected"),
            EventRoute::ConnectionRejected(code) => self.drop_session(&code),
            EventRoute::ConnectionAcknowledged => {
                debug!(target: "mqtt_transport", "Late ConnAck ignored");
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(target: "mqtt_transport", "Subscription confirmed: {}", packet_id);
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }
    }

    /// Poll the event loop until ConnAck, a failure, or the timeout
    async fn wait_for_connection_confirmation(
        event_loop: &mut EventLoop,
        timeout: Duration,
    ) -> Result<(), (FailureScope, MqttError)> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => return Ok(()),
                        EventRoute::ConnectionRejected(code) => {
                            return Err((FailureScope::Session, MqttError::ConnectionRefused(code)))
                        }
                        _ => continue,
                    },
                    Err(e) => {
                        let scope = MessageHandler::classify_session_attempt_error(&e);
                        return Err((scope, MqttError::ConnectionFailed(Box::new(e))));
                    }
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err((FailureScope::Session, MqttError::ConnAckTimeout(timeout))),
        }
    }

    /// Drive the event loop briefly, queueing inbound messages
    async fn drive_event_loop(&mut self) {
        for _ in 0..MAX_EVENTS_PER_PUMP {
            let Some(event_loop) = self.event_loop.as_mut() else {
                return;
            };

            let polled = tokio::time::timeout(PUMP_POLL_WINDOW, event_loop.poll()).await;
            match polled {
                // Nothing ready within the window
                Err(_) => return,
                Ok(Ok(event)) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    self.process_event_route(route);
                    if !self.inbound.is_empty() {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    let scope = MessageHandler::classify_connection_error(&e);
                    self.apply_failure(scope, &e.to_string());
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    fn link_status(&self) -> Liveness {
        self.link
    }

    async fn begin_link(&mut self) -> Result<(), Self::Error> {
        let target = (self.broker.host.clone(), self.broker.port);
        let lookup = tokio::time::timeout(self.link_timeout, tokio::net::lookup_host(target)).await;

        match lookup {
            Ok(Ok(mut addrs)) => match addrs.next() {
                Some(addr) => {
                    info!(broker = %self.broker.host, address = %addr, "Network link up");
                    self.link = Liveness::Up;
                    Ok(())
                }
                None => {
                    self.link = Liveness::Down;
                    Err(MqttError::LinkUnavailable(format!(
                        "{} resolved to no addresses",
                        self.broker.host
                    )))
                }
            },
            Ok(Err(e)) => {
                self.link = Liveness::Down;
                Err(MqttError::LinkUnavailable(format!(
                    "cannot resolve {}: {e}",
                    self.broker.host
                )))
            }
            Err(_) => {
                self.link = Liveness::Down;
                Err(MqttError::LinkUnavailable(format!(
                    "resolving {} timed out after {:?}",
                    self.broker.host, self.link_timeout
                )))
            }
        }
    }

    fn session_status(&self) -> Liveness {
        self.session
    }

    async fn begin_session(&mut self, params: &SessionParams) -> Result<(), Self::Error> {
        self.drop_session("starting new session");

        let mqtt_options = configure_mqtt_options(&self.broker, params, self.keep_alive);
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, self.request_capacity);

        match Self::wait_for_connection_confirmation(&mut event_loop, self.connect_timeout).await {
            Ok(()) => {
                self.client = Some(client);
                self.event_loop = Some(event_loop);
                self.session = Liveness::Up;
                Ok(())
            }
            Err((scope, e)) => {
                self.apply_failure(scope, &e.to_string());
                Err(e)
            }
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        client
            .try_publish(topic, to_rumqttc_qos(qos), retain, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        client
            .try_subscribe(topic, to_rumqttc_qos(qos))
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        if !self.subscribed_topics.iter().any(|t| t == topic) {
            self.subscribed_topics.push(topic.to_string());
        }
        info!("Subscribed to: {}", topic);
        Ok(())
    }

    async fn pump_inbound(&mut self) -> Option<InboundMessage> {
        if self.inbound.is_empty() {
            self.drive_event_loop().await;
        }
        self.inbound.pop_front()
    }

    fn identity_mac_address(&self) -> String {
        read_mac_address(Path::new("/sys/class/net"))
            .unwrap_or_else(|| "00:00:00:00:00:00".to_string())
    }
}

/// First non-zero interface address under a sysfs net directory, by name order
fn read_mac_address(net_dir: &Path) -> Option<String> {
    let mut interfaces: Vec<_> = std::fs::read_dir(net_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() != "lo")
        .collect();
    interfaces.sort_by_key(|entry| entry.file_name());

    interfaces.into_iter().find_map(|entry| {
        let address = std::fs::read_to_string(entry.path().join("address")).ok()?;
        let address = address.trim().to_uppercase();
        (address.len() == 17 && address != "00:00:00:00:00:00").then_some(address)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> MqttClient {
        MqttClient::new(&NodeConfig::test_config()).unwrap()
    }

    #[test]
    fn test_initial_state_is_down() {
        let client = test_client();
        assert_eq!(client.link_status(), Liveness::Down);
        assert_eq!(client.session_status(), Liveness::Down);
    }

    #[tokio::test]
    async fn test_publish_fails_without_session() {
        let mut client = test_client();
        let result = client
            .publish("esp32/status", b"{}".to_vec(), QoS::AtLeastOnce, true)
            .await;
        assert!(matches!(result, Err(MqttError::NotConnected)));
    }

    #[tokio::test]
    async fn test_subscribe_fails_without_session() {
        let mut client = test_client();
        let result = client.subscribe("esp32/command", QoS::AtLeastOnce).await;
        assert!(matches!(result, Err(MqttError::NotConnected)));
    }

    #[tokio::test]
    async fn test_pump_without_session_returns_nothing() {
        let mut client = test_client();
        assert!(client.pump_inbound().await.is_none());
    }

    #[test]
    fn test_retained_and_unsubscribed_messages_are_not_queued() {
        let mut client = test_client();
        client.subscribed_topics.push("esp32/command".to_string());

        client.process_event_route(EventRoute::MessageReceived {
            topic: "esp32/command".to_string(),
            payload: b"status".to_vec(),
            retain: true,
        });
        client.process_event_route(EventRoute::MessageReceived {
            topic: "esp32/other".to_string(),
            payload: b"status".to_vec(),
            retain: false,
        });
        assert!(client.inbound.is_empty());

        client.process_event_route(EventRoute::MessageReceived {
            topic: "esp32/command".to_string(),
            payload: b"status".to_vec(),
            retain: false,
        });
        assert_eq!(client.inbound.len(), 1);
    }

    #[test]
    fn test_link_failure_also_drops_session() {
        let mut client = test_client();
        client.link = Liveness::Up;
        client.session = Liveness::Up;

        client.apply_failure(FailureScope::Session, "refused");
        assert_eq!(client.link_status(), Liveness::Up);
        assert_eq!(client.session_status(), Liveness::Down);

        client.session = Liveness::Up;
        client.apply_failure(FailureScope::Link, "reset");
        assert_eq!(client.link_status(), Liveness::Down);
        assert_eq!(client.session_status(), Liveness::Down);
    }

    #[test]
    fn test_read_mac_address_skips_loopback_and_zero() {
        let dir = tempfile::tempdir().unwrap();
        for (name, address) in [
            ("lo", "00:00:00:00:00:00"),
            ("dummy0", "00:00:00:00:00:00"),
            ("eth0", "b8:27:eb:12:34:56"),
        ] {
            let iface = dir.path().join(name);
            std::fs::create_dir(&iface).unwrap();
            std::fs::write(iface.join("address"), format!("{address}\n")).unwrap();
        }

        assert_eq!(
            read_mac_address(dir.path()),
            Some("B8:27:EB:12:34:56".to_string())
        );
    }

    #[test]
    fn test_read_mac_address_missing_dir() {
        assert_eq!(read_mac_address(Path::new("/nonexistent/net")), None);
    }
}
