mod demo;
mod installer;

use clap::Parser;
use edge_bridge_core::{EdgeBridge, MqttBroker, MqttBrokerConfig, UrlFileDownloader};
use edge_bridge_models::GatewayConfig;
use edge_bridge_protocol::StatusProtocol;
use edge_bridge_utils::logger::Logger;
use installer::{GatewayFirmwareInstaller, LocalUrlFileDownloader};
use std::process::exit;
use std::sync::Arc;
use tracing::{error, info};

/// EdgeBridge - IoT gateway bridge
///
/// Routes, translates and buffers messages between a fleet of downstream
/// devices on a local MQTT broker and an upstream cloud platform.
#[derive(Parser)]
#[command(name = "edge-bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EdgeBridge gateway", long_about = None)]
struct Cli {
    /// Gateway configuration file (JSON)
    config_file: String,

    /// Console log level: TRACE, DEBUG, INFO, WARN or ERROR
    #[arg(default_value = "INFO")]
    log_level: String,

    /// Firmware version reported to the platform
    #[arg(default_value = "1.0.0")]
    firmware_version: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = Logger::parse_level(&cli.log_level).unwrap_or(tracing::Level::INFO);
    let mut logger = Logger::new(Some(level));
    if let Err(e) = logger.initialize() {
        eprintln!("Failed to initialize logger: {e}");
        exit(-1);
    }

    // Configuration parse failures are fatal
    let config = match GatewayConfig::load(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!(file = %cli.config_file, error = %e, "Failed to load configuration");
            exit(-1);
        }
    };

    let conn = match edge_bridge_storage::open_database(&config.database_path).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(path = %config.database_path, error = %e, "Failed to open database");
            exit(-1);
        }
    };

    let platform_broker = MqttBroker::new(MqttBrokerConfig {
        uri: config.platform_mqtt_uri.clone(),
        client_id: config.key.clone(),
        username: config.key.clone(),
        password: config.password.clone(),
        trust_store: config.platform_trust_store.clone(),
        last_will: Some((
            StatusProtocol::lastwill_channel(&config.key),
            StatusProtocol::lastwill_payload(),
        )),
    });

    let device_broker = MqttBroker::new(MqttBrokerConfig {
        uri: config.local_mqtt_uri.clone(),
        client_id: format!("{}-local-{}", config.key, short_id()),
        username: String::new(),
        password: String::new(),
        trust_store: None,
        last_will: None,
    });

    let firmware_installer = Arc::new(GatewayFirmwareInstaller::new(
        cli.config_file.clone(),
        cli.log_level.clone(),
        cli.firmware_version.clone(),
    ));
    let url_downloader: Arc<dyn UrlFileDownloader> = Arc::new(LocalUrlFileDownloader);

    let bridge = match EdgeBridge::init(
        &config,
        conn,
        platform_broker,
        device_broker,
        firmware_installer,
        Some(url_downloader),
        cli.firmware_version.clone(),
    )
    .await
    {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "Failed to initialize the gateway");
            exit(-1);
        }
    };

    bridge.connect().await;
    info!(version = %cli.firmware_version, "Gateway running");

    let demo = demo::DemoApplication::new(&config);
    let demo_task = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { demo.run(bridge).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");

    demo_task.abort();
    bridge.stop().await;
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
