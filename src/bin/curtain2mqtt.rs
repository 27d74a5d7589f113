//! Bridge daemon connecting one SwitchBot Curtain to an MQTT broker.

use clap::Parser;
use curtain2mqtt::{AlwaysConnected, BleCentral, BridgeSettings, CurtainBridge, RumqttcClient};
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Bridge a SwitchBot Curtain to an MQTT broker.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> curtain2mqtt::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = BridgeSettings::load(&args.config)?;

    let client = Arc::new(RumqttcClient::new(
        settings.mqtt.clone(),
        settings.client_id.clone(),
    ));
    let transport = Arc::new(BleCentral::new().await?);
    let bridge = CurtainBridge::new(client, transport, Arc::new(AlwaysConnected), &settings);

    info!(
        "Starting curtain2mqtt {} for {}",
        curtain2mqtt::VERSION,
        settings.device.address
    );

    bridge.connect(true).await;
    bridge.run().await;

    Ok(())
}
