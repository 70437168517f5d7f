use std::{sync::Arc, time::Duration};

use bridge::Bridge;
use color_eyre::Result;
use hyperion::stream::{start_hyperion_stream_loop, RECONNECT_DELAY};
use log::{info, warn, LevelFilter};
use protocols::mqtt::mk_mqtt_client;
use settings::{BridgeSettings, SettingsStore, DEFAULT_SETTINGS_PATH, MAX_BRIGHTNESS_SENTINEL};
use shutdown::shutdown_channel;
use tokio::sync::watch;

mod bridge;
mod color;
mod connection;
mod hyperion;
mod mqtt;
mod protocols;
mod settings;
mod shutdown;
mod throttle;

const SETTINGS_PATH_ENV: &str = "HYPERION_BRIDGE_CONFIG";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    pretty_env_logger::formatted_timed_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let settings_path =
        std::env::var(SETTINGS_PATH_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Arc::new(SettingsStore::open(settings_path).await);

    log_settings(&settings);

    let (shutdown_trigger, shutdown) = shutdown_channel();
    let (samples_tx, samples_rx) = watch::channel(None);

    let (mqtt_client, mqtt_task) = mk_mqtt_client(&settings.current(), shutdown.clone());
    let stream_task = start_hyperion_stream_loop(
        settings.clone(),
        samples_tx,
        RECONNECT_DELAY,
        shutdown.clone(),
    );

    let bridge = Bridge::new(settings, Arc::new(mqtt_client));
    let bridge_task = tokio::spawn(bridge.run(samples_rx, shutdown));

    tokio::signal::ctrl_c().await?;

    info!("Interrupt received, shutting down...");
    shutdown_trigger.trigger();

    let stopped = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = tokio::join!(stream_task, bridge_task, mqtt_task);
    })
    .await;

    if stopped.is_err() {
        warn!("Tasks did not stop within {:?}", SHUTDOWN_TIMEOUT);
    }

    Ok(())
}

fn log_settings(store: &SettingsStore) {
    let settings: Arc<BridgeSettings> = store.current();

    info!("Settings: {}", store.path().display());
    info!("Hyperion: {}", settings.hyperion_url);
    info!("MQTT broker: {}:{}", settings.mqtt_broker, settings.mqtt_port);
    info!("Controlling {} configured device(s):", settings.devices.len());

    for (i, device) in settings.devices.iter().enumerate() {
        let brightness = if device.brightness_multiplier == MAX_BRIGHTNESS_SENTINEL {
            "Max".to_string()
        } else {
            format!("{}%", (device.brightness_multiplier * 100.0) as i64)
        };
        let enabled = if device.enabled { "ENABLED" } else { "DISABLED" };

        info!(
            "  {}. {} ({}, {:?}) [{}]",
            i + 1,
            device.name,
            brightness,
            device.kind,
            enabled
        );
    }

    let interval = settings.throttle_interval();
    if interval.is_zero() {
        info!("Throttle rate: unthrottled");
    } else {
        info!(
            "Throttle rate: 1 update per {:?} ({:.1} Hz)",
            interval,
            1.0 / interval.as_secs_f64()
        );
    }
}
