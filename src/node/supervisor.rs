//! Link and session supervision
//!
//! The supervisor is the only component that asks the transport to connect.
//! Once per tick it re-queries the transport's own status accessors, attempts
//! whichever layer is down (subject to that layer's retry schedule), and keeps
//! a live session pumped. Failed attempts never sleep: they record the next
//! instant at which another attempt is allowed.

use super::{millis_u64, uptime_ms};
use crate::config::{ChannelConfig, Credentials, NodeConfig, RetryPolicy};
use crate::error::NodeError;
use crate::indicator::{Indicator, SignalPattern};
use crate::protocol::OfflinePayload;
use crate::transport::{InboundMessage, LastWill, QoS, SessionParams, Transport};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Upper bound on inbound messages drained in one tick
const MAX_INBOUND_PER_TICK: usize = 8;

/// Exclusive range of the random client id suffix
const CLIENT_ID_SUFFIX_SPACE: u32 = 0xffff;

/// Connectivity as decided at the end of a supervisor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    LinkDown,
    SessionDown,
    Connected,
}

/// Result of one [`ConnectionSupervisor::ensure_connected`] call
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub state: ConnectionState,
    /// Messages drained from the session this tick
    pub inbound: Vec<InboundMessage>,
    /// A new session came up during this tick
    pub session_established: bool,
}

impl TickReport {
    fn new(state: ConnectionState) -> Self {
        Self {
            state,
            inbound: Vec::new(),
            session_established: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Startup-time settings the supervisor needs
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub client_id_prefix: String,
    pub credentials: Option<Credentials>,
    /// Last will is published here, with the channel's QoS and retain flag
    pub status_channel: ChannelConfig,
    pub command_topic: String,
    pub link_retry: RetryPolicy,
    pub session_retry: RetryPolicy,
}

impl SupervisorSettings {
    /// Resolve settings, including credentials from the environment
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            client_id_prefix: config.device.client_id_prefix.clone(),
            credentials: config.mqtt.credentials(),
            status_channel: config.topics.status.clone(),
            command_topic: config.topics.command.clone(),
            link_retry: config.network.retry.clone(),
            session_retry: config.mqtt.session_retry.clone(),
        }
    }
}

/// Attempt bookkeeping for one connectivity layer
#[derive(Debug, Default)]
struct RetryState {
    /// Consecutive failed attempts
    failures: u32,
    retry_at: Option<Instant>,
}

impl RetryState {
    fn is_eligible(&self, now: Instant) -> bool {
        self.retry_at.map_or(true, |at| now >= at)
    }

    fn record_failure(&mut self, policy: &RetryPolicy, now: Instant) -> std::time::Duration {
        self.failures += 1;
        let delay = policy.delay_after_attempt(self.failures);
        self.retry_at = Some(now + delay);
        delay
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }
}

/// Owns the transport and every decision to connect over it
pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    settings: SupervisorSettings,
    indicator: Arc<dyn Indicator>,
    rng: StdRng,
    boot: Instant,
    link: RetryState,
    session: RetryState,
    state: ConnectionState,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// `rng` is seeded once by the caller and only used for client ids
    pub fn new(
        transport: T,
        settings: SupervisorSettings,
        indicator: Arc<dyn Indicator>,
        rng: StdRng,
        boot: Instant,
    ) -> Self {
        Self {
            transport,
            settings,
            indicator,
            rng,
            boot,
            link: RetryState::default(),
            session: RetryState::default(),
            state: ConnectionState::LinkDown,
        }
    }

    /// State decided by the most recent tick
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Hardware address reported by the transport
    pub fn identity_mac_address(&self) -> String {
        self.transport.identity_mac_address()
    }

    /// Bring connectivity as far up as the retry schedules allow
    pub async fn ensure_connected(&mut self, now: Instant) -> TickReport {
        self.ensure_connected_with(now, || None).await
    }

    /// Like [`ensure_connected`](Self::ensure_connected), announcing `online`
    /// on the status channel as soon as a new session comes up
    ///
    /// The announcement goes out before the command subscription and the
    /// session-up signal. `online` is only called when a session is made.
    pub async fn ensure_connected_with<F>(&mut self, now: Instant, online: F) -> TickReport
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        if !self.transport.link_status().is_up() {
            self.note_state(ConnectionState::LinkDown);
            if !self.link.is_eligible(now) || !self.attempt_link(now).await {
                return TickReport::new(ConnectionState::LinkDown);
            }
        }

        let mut report = TickReport::new(ConnectionState::SessionDown);

        if !self.transport.session_status().is_up() {
            self.note_state(ConnectionState::SessionDown);
            if !self.session.is_eligible(now) || !self.attempt_session(now, online).await {
                self.state = self.observed_state();
                report.state = self.state;
                return report;
            }
            report.session_established = true;
        }

        while report.inbound.len() < MAX_INBOUND_PER_TICK {
            match self.transport.pump_inbound().await {
                Some(message) => report.inbound.push(message),
                None => break,
            }
        }

        // The pump is where the transport notices a dead connection
        let observed = self.observed_state();
        self.note_state(observed);
        report.state = observed;
        report
    }

    /// Publish through the supervised session
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), NodeError> {
        self.transport
            .publish(topic, payload, qos, retain)
            .await
            .map_err(|e| NodeError::publish_rejected(topic, e))
    }

    fn observed_state(&self) -> ConnectionState {
        if !self.transport.link_status().is_up() {
            ConnectionState::LinkDown
        } else if !self.transport.session_status().is_up() {
            ConnectionState::SessionDown
        } else {
            ConnectionState::Connected
        }
    }

    fn note_state(&mut self, next: ConnectionState) {
        if self.state == ConnectionState::Connected && next != ConnectionState::Connected {
            warn!(state = ?next, "Connection lost");
        }
        self.state = next;
    }

    async fn attempt_link(&mut self, now: Instant) -> bool {
        let attempt = self.link.failures + 1;
        info!(attempt, "Bringing up network link");
        self.indicator.signal(SignalPattern::LinkAttempt);

        let result = self
            .transport
            .begin_link()
            .instrument(crate::connection_span!(layer = "link", attempt))
            .await;
        let failure = match result {
            Ok(()) if self.transport.link_status().is_up() => None,
            Ok(()) => Some(NodeError::link_failure("link still down after attempt")),
            Err(e) => Some(NodeError::link_failure(e)),
        };

        match failure {
            None => {
                self.link.reset();
                self.indicator.signal(SignalPattern::LinkUp);
                info!(
                    attempt,
                    mac = %self.transport.identity_mac_address(),
                    "Network link up"
                );
                true
            }
            Some(error) => {
                let delay = self.link.record_failure(&self.settings.link_retry, now);
                self.indicator.signal(SignalPattern::LinkFailed);
                warn!(
                    attempt,
                    delay_ms = millis_u64(delay),
                    error = %error,
                    "Network link attempt failed"
                );
                false
            }
        }
    }

    fn session_params(&mut self, now: Instant) -> SessionParams {
        let suffix = self.rng.gen_range(0..CLIENT_ID_SUFFIX_SPACE);
        let client_id = format!("{}-{suffix:x}", self.settings.client_id_prefix);

        let offline = OfflinePayload::new(uptime_ms(self.boot, now));
        let payload = serde_json::to_vec(&offline)
            .unwrap_or_else(|_| br#"{"status":"offline"}"#.to_vec());

        SessionParams {
            client_id,
            credentials: self.settings.credentials.clone(),
            last_will: LastWill {
                topic: self.settings.status_channel.topic.clone(),
                payload,
                qos: self.settings.status_channel.qos,
                retain: self.settings.status_channel.retain,
            },
        }
    }

    async fn attempt_session<F>(&mut self, now: Instant, online: F) -> bool
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        let attempt = self.session.failures + 1;
        let params = self.session_params(now);
        info!(attempt, client_id = %params.client_id, "Establishing broker session");

        let result = self
            .transport
            .begin_session(&params)
            .instrument(crate::mqtt_span!(client_id = %params.client_id, attempt))
            .await;
        if let Err(e) = result {
            let error = NodeError::session_failure(e);
            let delay = self.session.record_failure(&self.settings.session_retry, now);
            self.indicator.signal(SignalPattern::SessionFailed);
            warn!(
                attempt,
                delay_ms = millis_u64(delay),
                error = %error,
                "Broker session attempt failed"
            );
            return false;
        }

        self.session.reset();

        if let Some(payload) = online() {
            let channel = &self.settings.status_channel;
            match self
                .transport
                .publish(&channel.topic, payload, channel.qos, channel.retain)
                .await
            {
                Ok(()) => info!(topic = %channel.topic, "Announced online"),
                Err(e) => warn!(topic = %channel.topic, error = %e, "Online announcement rejected"),
            }
        }

        let command_topic = self.settings.command_topic.clone();
        match self
            .transport
            .subscribe(&command_topic, QoS::AtLeastOnce)
            .await
        {
            Ok(()) => debug!(topic = %command_topic, "Subscribed to command topic"),
            Err(e) => warn!(
                topic = %command_topic,
                error = %e,
                "Command subscription failed, commands unavailable this session"
            ),
        }

        self.indicator.signal(SignalPattern::SessionUp);
        info!(client_id = %params.client_id, "Broker session established");
        true
    }
}
