use std::time::Duration;

use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use http_delivery::{DeliveryResult, HttpDeliveryConfig, update_url};
use mqtt_ingest::{BrokerConfig, SessionConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngesterConfig {
    /// Log level (trace, debug, info, warn, error); unknown values fall back to info
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// MQTT broker host
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Topic carrying vehicle reports
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Fixed pause between reconnect attempts
    #[serde(default = "default_mqtt_reconnect_interval_secs")]
    pub mqtt_reconnect_interval_secs: u64,

    /// How long the first broker connection may take before startup fails
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Time allowed for the disconnect packet to flush on shutdown
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,

    // tinyFaaS configuration
    /// Base address of the function platform, `update` is appended
    #[serde(default = "default_tinyfaas_base")]
    pub tinyfaas_base: String,

    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC collector endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// MQTT defaults
fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "updates".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_reconnect_interval_secs() -> u64 {
    3
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_disconnect_grace_ms() -> u64 {
    250
}

// tinyFaaS defaults
fn default_tinyfaas_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_delivery_timeout_secs() -> u64 {
    5
}

// OpenTelemetry defaults
fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "ingester".to_string()
}

impl IngesterConfig {
    /// Read the configuration from unprefixed environment variables
    /// (`MQTT_HOST`, `TINYFAAS_BASE`, ...)
    ///
    /// Variables set to an empty string count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::default()
                    .try_parsing(true)
                    .ignore_empty(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn update_url(&self) -> DeliveryResult<String> {
        update_url(&self.tinyfaas_base)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            topic: self.mqtt_topic.clone(),
            reconnect_interval: Duration::from_secs(self.mqtt_reconnect_interval_secs),
        }
    }

    pub fn delivery_config(&self) -> HttpDeliveryConfig {
        HttpDeliveryConfig {
            timeout: Duration::from_secs(self.delivery_timeout_secs),
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}
