use std::time::Duration;

use color_eyre::Result;
use log::{debug, warn};

use crate::{
    color::ChromaticityPoint,
    protocols::mqtt::Broker,
    settings::{BridgeSettings, Device},
};

use super::light_command::mk_light_command;

/// Upper bound on waiting for the broker before a cycle is given up.
pub const CONNECT_WAIT: Duration = Duration::from_secs(2);

/// Sends `point` to every sync target in `settings`, each at its own
/// brightness.
///
/// Returns how many devices the command was handed to. A device that fails
/// is logged and skipped; if the broker is not reachable within
/// [`CONNECT_WAIT`] the sample is dropped and 0 is returned.
pub async fn fan_out<B: Broker + ?Sized>(
    broker: &B,
    settings: &BridgeSettings,
    point: &ChromaticityPoint,
) -> usize {
    if !broker.wait_connected(CONNECT_WAIT).await {
        debug!("[MQTT] Cannot publish - broker not connected");
        return 0;
    }

    let mut published = 0;

    for device in settings.sync_targets() {
        match publish_light_command(broker, device, point, settings.transition_time).await {
            Ok(()) => published += 1,
            Err(e) => warn!("[MQTT] Publish error to {} ({}): {:?}", device.topic, device.name, e),
        }
    }

    published
}

async fn publish_light_command<B: Broker + ?Sized>(
    broker: &B,
    device: &Device,
    point: &ChromaticityPoint,
    transition: f64,
) -> Result<()> {
    let command = mk_light_command(point, device, transition)?;
    let json = serde_json::to_string(&command)?;

    broker.publish(&device.topic, json).await
}
