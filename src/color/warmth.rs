use super::ColorSample;

/// Biases a sample towards red/orange.
///
/// Above 1.0 the blue channel is divided by `1 + (warmth - 1) * 3`, so a
/// warmth of 2.0 quarters it. Above 1.2 green is also scaled down by
/// `(warmth - 1.2) * 0.8`, which moves yellows towards orange. Channels are
/// truncated and clamped back into 8 bits.
pub fn apply_warmth(sample: ColorSample, warmth: f64) -> ColorSample {
    let r = f64::from(sample.r);
    let mut g = f64::from(sample.g);
    let mut b = f64::from(sample.b);

    if warmth > 1.0 {
        b = (b / (1.0 + (warmth - 1.0) * 3.0)).trunc();
    }

    if warmth > 1.2 {
        let factor = (warmth - 1.2) * 0.8;
        g = (g * (1.0 - factor)).trunc();
    }

    ColorSample {
        r: clamp_channel(r),
        g: clamp_channel(g),
        b: clamp_channel(b),
    }
}

fn clamp_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}
