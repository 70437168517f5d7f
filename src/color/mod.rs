use self::{warmth::apply_warmth, xy::rgb_to_xy};

pub mod warmth;
pub mod xy;

/// Average color of one upstream frame, 8 bits per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorSample {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        ColorSample { r, g, b }
    }
}

/// CIE 1931 chromaticity plus a Zigbee brightness (1 - 254).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChromaticityPoint {
    pub x: f64,
    pub y: f64,
    pub brightness: u8,
}

impl ChromaticityPoint {
    /// True for the black-frame result, which carries no usable chromaticity.
    pub fn is_degenerate(&self) -> bool {
        self.brightness == 0
    }
}

/// Runs a sample through the warmth filter and the xy conversion.
pub fn process_sample(sample: ColorSample, warmth: f64) -> ChromaticityPoint {
    rgb_to_xy(apply_warmth(sample, warmth))
}
