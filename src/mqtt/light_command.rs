use color_eyre::Result;
use derive_builder::Builder;
use serde::Serialize;

use crate::{
    color::ChromaticityPoint,
    settings::{Device, MAX_BRIGHTNESS_SENTINEL},
};

const MAX_BRIGHTNESS: f64 = 254.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub enum PowerState {
    #[default]
    #[serde(rename = "ON")]
    On,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

/// Zigbee2MQTT `set` payload for one light.
#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize)]
#[builder(setter(into), default)]
pub struct LightCommand {
    pub state: PowerState,
    pub color: Xy,
    /// 1 - 254
    pub brightness: u8,
    /// Seconds
    pub transition: f64,
}

/// Brightness for a device from its multiplier: the sentinel means full
/// brightness, anything else is scaled to 254 and kept within 1 - 254.
pub fn device_brightness(multiplier: f64) -> u8 {
    if multiplier == MAX_BRIGHTNESS_SENTINEL {
        return MAX_BRIGHTNESS as u8;
    }

    // NaN clamps to NaN and casts to 0, hence the max
    (multiplier * MAX_BRIGHTNESS).trunc().clamp(1.0, MAX_BRIGHTNESS).max(1.0) as u8
}

pub fn mk_light_command(
    point: &ChromaticityPoint,
    device: &Device,
    transition: f64,
) -> Result<LightCommand> {
    let command = LightCommandBuilder::default()
        .color(Xy {
            x: point.x,
            y: point.y,
        })
        .brightness(device_brightness(device.brightness_multiplier))
        .transition(transition)
        .build()?;

    Ok(command)
}
