//! The cooperative control loop
//!
//! Each tick first advances the [`ConnectionSupervisor`], handles any commands
//! it drained, and then, only while connected, fires whichever of the sample,
//! heartbeat and status timers have elapsed. Timers keep running while the
//! device is offline and fire on the first connected tick afterwards.

use super::change_filter::ChangeFilter;
use super::supervisor::{ConnectionState, ConnectionSupervisor};
use super::timers::{IntervalTimer, ReadingCounters};
use super::uptime_ms;
use crate::config::{ChannelConfig, NodeConfig, ThresholdsSection, TopicsSection};
use crate::error::NodeError;
use crate::indicator::{Indicator, SignalPattern};
use crate::protocol::{
    Command, DeviceStatusType, HeartbeatPayload, ReadingPayload, StatusPayload,
};
use crate::sensor::{heat_index_celsius, Reading, SensorSource};
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// What the loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// A `restart` command was accepted
    Restart,
}

/// Why [`PublicationScheduler::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Restart,
}

/// Startup-time settings the scheduler needs
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub device_id: String,
    pub sensor_model: String,
    pub topics: TopicsSection,
    pub thresholds: ThresholdsSection,
    pub sample_period: Duration,
    pub heartbeat_period: Duration,
    pub status_period: Duration,
    pub idle_delay: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &NodeConfig, device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            sensor_model: config.device.sensor_model.clone(),
            topics: config.topics.clone(),
            thresholds: config.thresholds,
            sample_period: config.intervals.sample_period(),
            heartbeat_period: config.intervals.heartbeat_period(),
            status_period: config.intervals.status_period(),
            idle_delay: config.intervals.idle_delay(),
        }
    }
}

fn status_payload(
    settings: &SchedulerSettings,
    counters: ReadingCounters,
    uptime: u64,
) -> StatusPayload {
    StatusPayload {
        status: DeviceStatusType::Online,
        device: settings.device_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime,
        total_readings: counters.total(),
        failed_readings: counters.failed(),
        reported_at: chrono::Utc::now(),
    }
}

/// Drives sampling and publication on top of a supervised connection
pub struct PublicationScheduler<T: Transport, S: SensorSource> {
    supervisor: ConnectionSupervisor<T>,
    sensor: S,
    indicator: Arc<dyn Indicator>,
    settings: SchedulerSettings,
    filter: ChangeFilter,
    sample_timer: IntervalTimer,
    heartbeat_timer: IntervalTimer,
    status_timer: IntervalTimer,
    counters: ReadingCounters,
    boot: Instant,
    ticks: u64,
}

impl<T: Transport, S: SensorSource> PublicationScheduler<T, S> {
    /// All timers start counting at `boot`
    pub fn new(
        supervisor: ConnectionSupervisor<T>,
        sensor: S,
        indicator: Arc<dyn Indicator>,
        settings: SchedulerSettings,
        boot: Instant,
    ) -> Self {
        Self {
            filter: ChangeFilter::new(settings.thresholds),
            sample_timer: IntervalTimer::new(settings.sample_period, boot),
            heartbeat_timer: IntervalTimer::new(settings.heartbeat_period, boot),
            status_timer: IntervalTimer::new(settings.status_period, boot),
            supervisor,
            sensor,
            indicator,
            settings,
            counters: ReadingCounters::default(),
            boot,
            ticks: 0,
        }
    }

    pub fn counters(&self) -> ReadingCounters {
        self.counters
    }

    pub fn change_filter(&self) -> &ChangeFilter {
        &self.filter
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<T> {
        &self.supervisor
    }

    /// Loop iterations since boot
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until a `restart` command arrives
    pub async fn run(mut self) -> RunOutcome {
        info!(
            device_id = %self.settings.device_id,
            sample_secs = self.settings.sample_period.as_secs(),
            heartbeat_secs = self.settings.heartbeat_period.as_secs(),
            "Control loop started"
        );

        loop {
            if self.tick(Instant::now()).await == TickOutcome::Restart {
                return RunOutcome::Restart;
            }
            tokio::time::sleep(self.settings.idle_delay).await;
        }
    }

    /// One control loop iteration
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        self.ticks += 1;

        let settings = &self.settings;
        let counters = self.counters;
        let uptime = uptime_ms(self.boot, now);
        let report = self
            .supervisor
            .ensure_connected_with(now, || {
                serde_json::to_vec(&status_payload(settings, counters, uptime)).ok()
            })
            .await;

        // The session-up announcement counts as this window's status
        if report.session_established {
            self.status_timer.fire(now);
        }

        let mut outcome = TickOutcome::Continue;
        for message in &report.inbound {
            match Command::from_message(message, &self.settings.topics.command) {
                Some(command) => {
                    if self.handle_command(command, now).await == TickOutcome::Restart {
                        outcome = TickOutcome::Restart;
                    }
                }
                None => debug!(topic = %message.topic, "Ignoring message on unexpected topic"),
            }
        }
        if outcome == TickOutcome::Restart {
            return outcome;
        }

        if report.state != ConnectionState::Connected {
            return TickOutcome::Continue;
        }

        if self.sample_timer.poll(now) {
            let span = crate::sensor_span!(tick = self.ticks);
            self.sample(now).instrument(span).await;
        }

        if self.heartbeat_timer.poll(now) {
            self.publish_heartbeat(now).await;
        }

        if self.status_timer.poll(now) {
            self.publish_status(now).await;
        }

        TickOutcome::Continue
    }

    async fn handle_command(&mut self, command: Command, now: Instant) -> TickOutcome {
        match command {
            Command::Restart => {
                warn!("Restart command received");
                TickOutcome::Restart
            }
            Command::Status => {
                info!("Status command received");
                self.publish_status(now).await;
                TickOutcome::Continue
            }
            Command::Unrecognized { name } => {
                let error = NodeError::UnrecognizedCommand { name };
                warn!(error = %error, "Discarding command");
                TickOutcome::Continue
            }
        }
    }

    async fn sample(&mut self, now: Instant) {
        let reading = match self.sensor.read(now) {
            Ok(reading) => reading,
            Err(e) => {
                self.counters.record_fault();
                self.indicator.signal(SignalPattern::SensorFault);
                let error = NodeError::from(e);
                warn!(
                    error = %error,
                    total_readings = self.counters.total(),
                    failed_readings = self.counters.failed(),
                    "Sensor read failed, skipping cycle"
                );
                return;
            }
        };

        self.counters.record_success();
        info!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            heat_index = heat_index_celsius(reading.temperature, reading.humidity),
            total_readings = self.counters.total(),
            failed_readings = self.counters.failed(),
            "Reading taken"
        );

        if !self.filter.should_publish(&reading) {
            debug!("Change below thresholds, not publishing");
            return;
        }

        self.publish_reading(reading, now).await;
    }

    async fn publish_reading(&mut self, reading: Reading, now: Instant) {
        let timestamp = uptime_ms(self.boot, now);
        let sensor = &self.settings.sensor_model;
        let temperature = ReadingPayload::temperature(reading.temperature, timestamp, sensor);
        let humidity = ReadingPayload::humidity(reading.humidity, timestamp, sensor);

        let temperature_sent = Self::publish_json(
            &mut self.supervisor,
            &self.settings.topics.temperature,
            &temperature,
        )
        .await;
        let humidity_sent = Self::publish_json(
            &mut self.supervisor,
            &self.settings.topics.humidity,
            &humidity,
        )
        .await;

        // Recorded even on partial failure; the next qualifying reading retries
        self.filter.record_published(reading);

        if temperature_sent || humidity_sent {
            self.indicator.signal(SignalPattern::Published);
        }
        info!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            temperature_sent,
            humidity_sent,
            "Reading published"
        );
    }

    async fn publish_heartbeat(&mut self, now: Instant) {
        let payload = HeartbeatPayload::new(uptime_ms(self.boot, now), self.ticks);
        if Self::publish_json(
            &mut self.supervisor,
            &self.settings.topics.heartbeat,
            &payload,
        )
        .await
        {
            debug!(uptime = payload.uptime, ticks = payload.ticks, "Heartbeat sent");
        }
    }

    async fn publish_status(&mut self, now: Instant) {
        let payload = status_payload(&self.settings, self.counters, uptime_ms(self.boot, now));
        if Self::publish_json(&mut self.supervisor, &self.settings.topics.status, &payload).await
        {
            info!(
                total_readings = payload.total_readings,
                failed_readings = payload.failed_readings,
                "Status published"
            );
        }
    }

    /// Serialize and publish; failures are logged and reported as `false`
    async fn publish_json<P: Serialize>(
        supervisor: &mut ConnectionSupervisor<T>,
        channel: &ChannelConfig,
        payload: &P,
    ) -> bool {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(topic = %channel.topic, error = %e, "Failed to serialize payload");
                return false;
            }
        };

        match supervisor
            .publish(&channel.topic, bytes, channel.qos, channel.retain)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Publish rejected");
                false
            }
        }
    }
}
