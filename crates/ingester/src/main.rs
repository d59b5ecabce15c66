mod config;

use common::domain::{IngestService, IngestStats};
use common::telemetry::{TelemetryProviders, init_telemetry, shutdown_telemetry};
use crate::config::IngesterConfig;
use http_delivery::HttpDeliveryClient;
use ingester_runner::Runner;
use mqtt_ingest::{BrokerSession, MqttIngester, MqttTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match IngesterConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        mqtt_topic = %config.mqtt_topic,
        tinyfaas_base = %config.tinyfaas_base,
        otel_enabled = config.otel_enabled,
        "Starting ingester"
    );
    debug!("Configuration: {:?}", config);

    let target_url = match config.update_url() {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "Invalid downstream address");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let delivery = match HttpDeliveryClient::new(config.delivery_config()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build delivery client");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let service = Arc::new(IngestService::new(Arc::new(delivery), target_url));
    let stats = Arc::new(IngestStats::new());

    let transport = MqttTransport::new(&config.broker_config());
    let mut session = BrokerSession::new(transport, config.session_config());
    if let Err(e) = session.connect(config.startup_timeout()).await {
        error!(
            error = %e,
            mqtt_host = %config.mqtt_host,
            mqtt_port = config.mqtt_port,
            "Could not reach broker during startup"
        );
        shutdown_telemetry(telemetry_providers);
        std::process::exit(1);
    }

    let ingester = MqttIngester::new(session, service, stats, config.disconnect_grace());

    let outcome = Runner::new()
        .with_app_process(move |ctx| ingester.run(ctx))
        .with_closer(move || async move {
            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    std::process::exit(outcome.code());
}
