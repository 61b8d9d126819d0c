//! Sensor Agent - Main Entry Point
//!
//! Loads configuration, wires the transport, sensor and indicator into the
//! control loop, and re-executes itself when a `restart` command arrives.

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensor_agent::config::{ConfigError, IndicatorSection, NodeConfig, SensorSection};
use sensor_agent::indicator::{Indicator, LedIndicator, LogIndicator};
use sensor_agent::node::{
    ConnectionSupervisor, PublicationScheduler, RunOutcome, SchedulerSettings, SupervisorSettings,
};
use sensor_agent::observability::init_default_logging;
use sensor_agent::sensor::{IioSensor, SensorSource, SimulatedSensor};
use sensor_agent::transport::{MqttTransport, Transport};
use sensor_agent::{NodeError, NodeResult};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Temperature/humidity telemetry agent
#[derive(Parser)]
#[command(name = "sensor-agent")]
#[command(about = "Publishes temperature and humidity readings over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SENSOR_AGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control loop
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["sensor-agent.toml", "config/sensor-agent.toml"];

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let result = match load_configuration(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Run => run_agent(config).await,
            Commands::Config { show } => handle_config_command(&config, show),
        },
        Err(e) => Err(NodeError::from(e)),
    };

    if let Err(e) = result {
        if e.is_fatal() {
            error!("Startup failed: {}", e);
        } else {
            error!("Command failed: {}", e);
        }
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return NodeConfig::load_from_file(path);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return NodeConfig::load_from_file(path);
        }
    }

    Err(ConfigError::NotFound(DEFAULT_CONFIG_PATHS[0].to_string()))
}

fn build_sensor(config: &NodeConfig) -> Box<dyn SensorSource> {
    match &config.sensor {
        SensorSection::Simulated {
            seed,
            fault_rate,
            base_temperature,
            base_humidity,
        } => {
            info!(fault_rate, "Using simulated sensor");
            Box::new(SimulatedSensor::new(
                *seed,
                *fault_rate,
                *base_temperature,
                *base_humidity,
            ))
        }
        SensorSection::Iio { device_path } => {
            info!(device_path = %device_path, "Using IIO sensor");
            Box::new(IioSensor::new(device_path))
        }
    }
}

fn build_indicator(config: &NodeConfig) -> Arc<dyn Indicator> {
    match &config.indicator {
        IndicatorSection::Log => Arc::new(LogIndicator),
        IndicatorSection::Led { brightness_path } => Arc::new(LedIndicator::new(brightness_path)),
    }
}

/// Configured id, or one derived from the hardware address
fn resolve_device_id(config: &NodeConfig, mac_address: &str) -> String {
    match &config.device.id {
        Some(id) => id.clone(),
        None => format!("esp32-{}", mac_address.replace(':', "").to_lowercase()),
    }
}

fn log_startup_banner(config: &NodeConfig, device_id: &str, mac_address: &str) {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "Starting {}",
        config.device.name
    );
    info!(device_id = %device_id, mac = %mac_address, sensor = %config.device.sensor_model, "Device identity");
    info!(
        broker = %config.mqtt.broker_url,
        sample_secs = config.intervals.sample_secs,
        heartbeat_secs = config.intervals.heartbeat_secs,
        status_secs = config.intervals.status_secs,
        temperature_delta = config.thresholds.temperature_delta,
        humidity_delta = config.thresholds.humidity_delta,
        "Publication settings"
    );
}

async fn run_agent(config: NodeConfig) -> NodeResult<()> {
    let boot = Instant::now();

    let transport = MqttTransport::new(&config)?;
    let mac_address = transport.identity_mac_address();
    let device_id = resolve_device_id(&config, &mac_address);
    log_startup_banner(&config, &device_id, &mac_address);

    let indicator = build_indicator(&config);
    let supervisor = ConnectionSupervisor::new(
        transport,
        SupervisorSettings::from_config(&config),
        indicator.clone(),
        StdRng::from_entropy(),
        boot,
    );
    let scheduler = PublicationScheduler::new(
        supervisor,
        build_sensor(&config),
        indicator,
        SchedulerSettings::from_config(&config, device_id),
        boot,
    );

    match scheduler.run().await {
        RunOutcome::Restart => {
            let grace = config.intervals.restart_grace();
            warn!(grace_secs = grace.as_secs(), "Restarting after grace delay");
            tokio::time::sleep(grace).await;
            Err(NodeError::RestartFailed(restart_process()))
        }
    }
}

/// Replace the current process with a fresh copy of itself
///
/// Only returns if the restart could not be performed.
#[cfg(unix)]
fn restart_process() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    match std::env::current_exe() {
        Ok(exe) => process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .exec(),
        Err(e) => e,
    }
}

#[cfg(not(unix))]
fn restart_process() -> std::io::Error {
    let spawned = std::env::current_exe().and_then(|exe| {
        process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .spawn()
    });
    match spawned {
        Ok(_) => process::exit(0),
        Err(e) => e,
    }
}

fn handle_config_command(config: &NodeConfig, show: bool) -> NodeResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config).map_err(ConfigError::from)?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}
