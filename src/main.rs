use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager as BtManager;
use clap::Parser;
use log::info;

mod codec;
mod config;
mod discovery;
mod drivers;
mod error;
mod manager;
mod messages;
mod mqtt;
mod peripheral;
mod registry;
mod scanner;
mod scheduler;
#[cfg(test)]
mod testing;

/// Bridge BLE presence and plant sensors to MQTT.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or(args.log_level);
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filter)
        .init();

    let config_contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config: config::AppConfig = toml::de::from_str(&config_contents)?;
    let drivers = config.driver_config()?;
    let tick = config.tick()?;

    info!("Devices: {:?}", config.devices);
    let names: HashMap<_, _> = config
        .devices
        .iter()
        .flatten()
        .map(|device| (device.address, device.name.clone()))
        .collect();

    let (mqtt_client, mut eventloop) = mqtt::MqttClient::new(&config.mqtt);
    tokio::spawn(async move {
        mqtt::MqttClient::event_loop(&mut eventloop).await;
    });

    let bt_manager = BtManager::new().await?;

    // get the first bluetooth adapter
    let central = bt_manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .context("no bluetooth adapter found")?;

    let scanner = scanner::BleScanner::new(central);
    let events = scanner.start().await?;

    let core = manager::Manager::new(
        drivers,
        tick,
        names,
        Arc::new(scanner),
        Arc::new(mqtt_client.clone()),
    );
    let mut running = core.start(events);

    tokio::select! {
        _ = running.wait() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, shutting down");
        }
    }
    running.stop();
    info!("{} devices known", running.registry().len().await);

    mqtt_client.disconnect().await?;

    Ok(())
}
