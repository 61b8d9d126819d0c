//! Test helpers and utilities for integration tests

use rand::rngs::StdRng;
use rand::SeedableRng;
use sensor_agent::config::NodeConfig;
use sensor_agent::indicator::Indicator;
use sensor_agent::node::{
    ConnectionSupervisor, PublicationScheduler, SchedulerSettings, SupervisorSettings,
};
use sensor_agent::sensor::{Reading, SensorError};
use sensor_agent::testing::{
    test_node_config, MockTransport, PublishedMessage, RecordingIndicator, ScriptedSensor,
};
use std::sync::Arc;
use tokio::time::Instant;

#[allow(dead_code)]
pub type TestScheduler = PublicationScheduler<MockTransport, ScriptedSensor>;

/// Everything a scenario test needs to drive and observe the loop
#[allow(dead_code)]
pub struct Harness {
    pub scheduler: TestScheduler,
    pub transport: MockTransport,
    pub sensor: ScriptedSensor,
    pub indicator: Arc<RecordingIndicator>,
    pub boot: Instant,
}

/// Build a scheduler over mocks from the given configuration
#[allow(dead_code)]
pub fn harness_with_config(
    config: &NodeConfig,
    script: Vec<Result<(f64, f64), SensorError>>,
) -> Harness {
    let boot = Instant::now();
    let transport = MockTransport::new();
    let sensor = ScriptedSensor::new(script);
    let indicator = Arc::new(RecordingIndicator::new());
    let shared: Arc<dyn Indicator> = indicator.clone();

    let supervisor = ConnectionSupervisor::new(
        transport.clone(),
        SupervisorSettings::from_config(config),
        shared.clone(),
        StdRng::seed_from_u64(0x5eed),
        boot,
    );
    let scheduler = PublicationScheduler::new(
        supervisor,
        sensor.clone(),
        shared,
        SchedulerSettings::from_config(config, "test-device"),
        boot,
    );

    Harness {
        scheduler,
        transport,
        sensor,
        indicator,
        boot,
    }
}

/// Build a scheduler over mocks with default configuration
#[allow(dead_code)]
pub fn harness(script: Vec<Result<(f64, f64), SensorError>>) -> Harness {
    harness_with_config(&test_node_config(), script)
}

/// Decode the JSON payload of a published message
#[allow(dead_code)]
pub fn json(message: &PublishedMessage) -> serde_json::Value {
    serde_json::from_slice(&message.payload).expect("payload should be JSON")
}

/// Build a reading at an arbitrary instant
#[allow(dead_code)]
pub fn reading(temperature: f64, humidity: f64) -> Reading {
    Reading::new(temperature, humidity, Instant::now()).expect("finite reading")
}
