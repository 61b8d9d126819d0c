//! Mock implementations for testing
//!
//! Provides a scripted Transport, SensorSource and Indicator so the supervisor
//! and scheduler can be exercised without a broker, a network or hardware.
//! Every mock is a cheap clonable handle over shared state: hand one clone to
//! the code under test and keep another to script and inspect it.

use crate::indicator::{Indicator, SignalPattern};
use crate::sensor::{Reading, SensorError, SensorSource};
use crate::transport::{InboundMessage, Liveness, QoS, SessionParams, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message handed to [`MockTransport::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Publish and subscribe calls in the order they reached the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Publish(String),
    Subscribe(String),
}

/// Errors produced by the mock transport
#[derive(Debug, Error, PartialEq)]
pub enum MockTransportError {
    #[error("mock link failure")]
    LinkFailed,
    #[error("mock session failure")]
    SessionFailed,
    #[error("mock publish rejected")]
    PublishRejected,
    #[error("mock subscribe rejected")]
    SubscribeRejected,
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug)]
struct MockTransportState {
    link: Liveness,
    session: Liveness,
    link_failures_pending: u32,
    session_failures_pending: u32,
    link_attempts: usize,
    session_attempts: Vec<SessionParams>,
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    operations: Vec<MockOperation>,
    inbound: VecDeque<InboundMessage>,
    reject_publishes: bool,
    reject_subscribes: bool,
    drop_session_on_pump: bool,
    pumps: usize,
    mac_address: String,
}

impl Default for MockTransportState {
    fn default() -> Self {
        Self {
            link: Liveness::Down,
            session: Liveness::Down,
            link_failures_pending: 0,
            session_failures_pending: 0,
            link_attempts: 0,
            session_attempts: Vec::new(),
            subscriptions: Vec::new(),
            published: Vec::new(),
            operations: Vec::new(),
            inbound: VecDeque::new(),
            reject_publishes: false,
            reject_subscribes: false,
            drop_session_on_pump: false,
            pumps: 0,
            mac_address: "24:6f:28:aa:bb:cc".to_string(),
        }
    }
}

/// Scripted transport; link and session succeed unless told otherwise
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` link attempts
    pub fn fail_next_links(&self, count: u32) {
        lock(&self.state).link_failures_pending = count;
    }

    /// Fail the next `count` session attempts
    pub fn fail_next_sessions(&self, count: u32) {
        lock(&self.state).session_failures_pending = count;
    }

    /// Reject every publish while set
    pub fn reject_publishes(&self, reject: bool) {
        lock(&self.state).reject_publishes = reject;
    }

    pub fn reject_subscribes(&self, reject: bool) {
        lock(&self.state).reject_subscribes = reject;
    }

    /// Simulate the broker going away without the supervisor noticing yet
    pub fn drop_session(&self) {
        lock(&self.state).session = Liveness::Down;
    }

    /// Simulate losing the network link; the session goes with it
    pub fn drop_link(&self) {
        let mut state = lock(&self.state);
        state.link = Liveness::Down;
        state.session = Liveness::Down;
    }

    /// Make the next pump observe a dead session
    pub fn drop_session_on_next_pump(&self) {
        lock(&self.state).drop_session_on_pump = true;
    }

    /// Queue a message for a later pump
    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        lock(&self.state).inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    pub fn set_mac_address(&self, mac: &str) {
        lock(&self.state).mac_address = mac.to_string();
    }

    pub fn link_attempts(&self) -> usize {
        lock(&self.state).link_attempts
    }

    pub fn session_attempts(&self) -> Vec<SessionParams> {
        lock(&self.state).session_attempts.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        lock(&self.state)
            .published
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        lock(&self.state).operations.clone()
    }

    pub fn pumps(&self) -> usize {
        lock(&self.state).pumps
    }

    pub fn clear_history(&self) {
        let mut state = lock(&self.state);
        state.published.clear();
        state.operations.clear();
        state.session_attempts.clear();
        state.subscriptions.clear();
        state.link_attempts = 0;
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    fn link_status(&self) -> Liveness {
        lock(&self.state).link
    }

    async fn begin_link(&mut self) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.link_attempts += 1;
        if state.link_failures_pending > 0 {
            state.link_failures_pending -= 1;
            return Err(MockTransportError::LinkFailed);
        }
        state.link = Liveness::Up;
        Ok(())
    }

    fn session_status(&self) -> Liveness {
        lock(&self.state).session
    }

    async fn begin_session(&mut self, params: &SessionParams) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        state.session_attempts.push(params.clone());
        if !state.link.is_up() {
            return Err(MockTransportError::NotConnected);
        }
        if state.session_failures_pending > 0 {
            state.session_failures_pending -= 1;
            return Err(MockTransportError::SessionFailed);
        }
        state.session = Liveness::Up;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.reject_publishes {
            return Err(MockTransportError::PublishRejected);
        }
        if !state.session.is_up() {
            return Err(MockTransportError::NotConnected);
        }
        state.operations.push(MockOperation::Publish(topic.to_string()));
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.reject_subscribes {
            return Err(MockTransportError::SubscribeRejected);
        }
        state.subscriptions.push(topic.to_string());
        state.operations.push(MockOperation::Subscribe(topic.to_string()));
        Ok(())
    }

    async fn pump_inbound(&mut self) -> Option<InboundMessage> {
        let mut state = lock(&self.state);
        state.pumps += 1;
        if state.drop_session_on_pump {
            state.drop_session_on_pump = false;
            state.session = Liveness::Down;
            return None;
        }
        state.inbound.pop_front()
    }

    fn identity_mac_address(&self) -> String {
        lock(&self.state).mac_address.clone()
    }
}

#[derive(Debug, Default)]
struct ScriptedSensorState {
    script: VecDeque<Result<(f64, f64), SensorError>>,
    reads: usize,
}

/// Sensor that replays a fixed list of outcomes, then reports faults
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    state: Arc<Mutex<ScriptedSensorState>>,
}

impl ScriptedSensor {
    /// Each entry is `(temperature, humidity)` or a fault
    pub fn new(script: Vec<Result<(f64, f64), SensorError>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedSensorState {
                script: script.into(),
                reads: 0,
            })),
        }
    }

    /// Append one more outcome
    pub fn push(&self, outcome: Result<(f64, f64), SensorError>) {
        lock(&self.state).script.push_back(outcome);
    }

    /// Number of read calls so far
    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }
}

impl SensorSource for ScriptedSensor {
    fn read(&mut self, now: Instant) -> Result<Reading, SensorError> {
        let mut state = lock(&self.state);
        state.reads += 1;
        match state.script.pop_front() {
            Some(Ok((temperature, humidity))) => Reading::new(temperature, humidity, now),
            Some(Err(e)) => Err(e),
            None => Err(SensorError::ReadFailed("script exhausted".to_string())),
        }
    }
}

/// Indicator that remembers every pattern it was asked to show
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    patterns: Mutex<Vec<SignalPattern>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> Vec<SignalPattern> {
        lock(&self.patterns).clone()
    }

    pub fn count(&self, pattern: SignalPattern) -> usize {
        lock(&self.patterns)
            .iter()
            .filter(|seen| **seen == pattern)
            .count()
    }
}

impl Indicator for RecordingIndicator {
    fn signal(&self, pattern: SignalPattern) {
        lock(&self.patterns).push(pattern);
    }
}
