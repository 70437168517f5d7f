use color_eyre::Result;
use eyre::eyre;
use serde::{Deserialize, Serialize};

use crate::color::ColorSample;

#[derive(Serialize, Debug, Clone)]
struct LedColorsCommand {
    command: &'static str,
    subcommand: &'static str,
}

/// Message asking Hyperion to start streaming LED colors.
pub fn ledstream_start_message() -> Result<String> {
    let command = LedColorsCommand {
        command: "ledcolors",
        subcommand: "ledstream-start",
    };

    Ok(serde_json::to_string(&command)?)
}

#[derive(Deserialize, Debug, Clone)]
struct LedStreamData {
    /// Flat `[r, g, b, r, g, b, ...]`
    leds: Vec<u8>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "command")]
enum HyperionMessage {
    #[serde(rename = "ledcolors-ledstream-update")]
    LedStreamUpdate { data: LedStreamData },

    // Command replies, other subscriptions
    #[serde(other)]
    Other,
}

/// Decodes one websocket text frame.
///
/// Returns `Ok(None)` for messages that are not LED stream updates, and an
/// error for frames that cannot be used.
pub fn decode_frame(text: &str) -> Result<Option<ColorSample>> {
    let de = &mut serde_json::Deserializer::from_str(text);
    let message: HyperionMessage = serde_path_to_error::deserialize(de)?;

    match message {
        HyperionMessage::LedStreamUpdate { data } => average_leds(&data.leds).map(Some),
        HyperionMessage::Other => Ok(None),
    }
}

/// Integer (truncating) average over every complete RGB triple.
pub fn average_leds(leds: &[u8]) -> Result<ColorSample> {
    let triples = leds.chunks_exact(3);
    let count = triples.len() as u64;

    if count == 0 {
        return Err(eyre!(
            "LED stream update carries no full RGB triple ({} values)",
            leds.len()
        ));
    }

    let (r, g, b) = triples.fold((0u64, 0u64, 0u64), |(r, g, b), led| {
        (r + u64::from(led[0]), g + u64::from(led[1]), b + u64::from(led[2]))
    });

    // Each average is at most 255
    Ok(ColorSample::new(
        (r / count) as u8,
        (g / count) as u8,
        (b / count) as u8,
    ))
}
