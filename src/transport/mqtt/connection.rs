//! Pure connection configuration for the MQTT transport
//!
//! This module contains pure functions that turn session parameters into
//! rumqttc options, plus the transport's error type.

use crate::config::BrokerAddress;
use crate::transport::{QoS, SessionParams};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS as RumqttcQoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),
    #[error("ConnAck timeout after {0:?}")]
    ConnAckTimeout(Duration),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected")]
    NotConnected,
}

/// Map our QoS onto rumqttc's (pure function)
pub fn to_rumqttc_qos(qos: QoS) -> RumqttcQoS {
    match qos {
        QoS::AtMostOnce => RumqttcQoS::AtMostOnce,
        QoS::AtLeastOnce => RumqttcQoS::AtLeastOnce,
        QoS::ExactlyOnce => RumqttcQoS::ExactlyOnce,
    }
}

/// Pure function to build MQTT options for one session attempt
pub fn configure_mqtt_options(
    broker: &BrokerAddress,
    params: &SessionParams,
    keep_alive: Duration,
) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(&params.client_id, &broker.host, broker.port);

    if broker.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(credentials) = &params.credentials {
        mqtt_options.set_credentials(&credentials.username, &credentials.password);
    }

    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_start(true);

    // MQTT v5 LastWill takes 5 parameters: topic, payload, qos, retain, properties
    let will = &params.last_will;
    let lwt = LastWill::new(
        &will.topic,
        will.payload.clone(),
        to_rumqttc_qos(will.qos),
        will.retain,
        None,
    );
    mqtt_options.set_last_will(lwt);

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::transport::LastWill as DeviceWill;

    fn test_params() -> SessionParams {
        SessionParams {
            client_id: "ESP32-DHT11-1a2b".to_string(),
            credentials: Some(Credentials {
                username: "device".to_string(),
                password: "secret".to_string(),
            }),
            last_will: DeviceWill {
                topic: "esp32/status".to_string(),
                payload: br#"{"status":"offline","timestamp":0}"#.to_vec(),
                qos: QoS::AtLeastOnce,
                retain: true,
            },
        }
    }

    fn test_broker() -> BrokerAddress {
        BrokerAddress {
            host: "localhost".to_string(),
            port: 1883,
            tls: false,
        }
    }

    #[test]
    fn test_configure_mqtt_options_identity_and_keep_alive() {
        let options =
            configure_mqtt_options(&test_broker(), &test_params(), Duration::from_secs(60));

        assert_eq!(options.client_id(), "ESP32-DHT11-1a2b");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_configure_mqtt_options_sets_last_will() {
        let options =
            configure_mqtt_options(&test_broker(), &test_params(), Duration::from_secs(60));

        let will = options.last_will().expect("last will should be configured");
        assert_eq!(&will.topic[..], b"esp32/status");
        assert!(will.retain);
        assert_eq!(will.qos, RumqttcQoS::AtLeastOnce);
    }

    #[test]
    fn test_configure_mqtt_options_sets_credentials() {
        let options =
            configure_mqtt_options(&test_broker(), &test_params(), Duration::from_secs(60));
        assert!(options.credentials().is_some());

        let mut anonymous = test_params();
        anonymous.credentials = None;
        let options = configure_mqtt_options(&test_broker(), &anonymous, Duration::from_secs(60));
        assert!(options.credentials().is_none());
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_rumqttc_qos(QoS::AtMostOnce), RumqttcQoS::AtMostOnce);
        assert_eq!(to_rumqttc_qos(QoS::AtLeastOnce), RumqttcQoS::AtLeastOnce);
        assert_eq!(to_rumqttc_qos(QoS::ExactlyOnce), RumqttcQoS::ExactlyOnce);
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::LinkUnavailable("dns".to_string()),
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::ConnectionRefused("NotAuthorized".to_string()),
            MqttError::ConnAckTimeout(Duration::from_secs(10)),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::NotConnected,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
