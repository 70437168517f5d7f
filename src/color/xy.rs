use palette::{white_point::D65, FromColor, Srgb, Xyz, Yxy};

use super::{ChromaticityPoint, ColorSample};

const MAX_BRIGHTNESS: f64 = 254.0;

/// sRGB to CIE 1931 xy using the wide gamut matrix Zigbee lights expect.
///
/// The all-black sample has no chromaticity and yields `(0, 0)` with
/// brightness 0. Every other sample yields a brightness in 1 - 254.
pub fn rgb_to_xy(sample: ColorSample) -> ChromaticityPoint {
    let rgb: Srgb<f64> = Srgb::new(sample.r, sample.g, sample.b).into_format();

    let r = inverse_gamma(rgb.red);
    let g = inverse_gamma(rgb.green);
    let b = inverse_gamma(rgb.blue);

    let xyz = Xyz::<D65, f64>::new(
        r * 0.649926 + g * 0.103455 + b * 0.197109,
        r * 0.234327 + g * 0.743075 + b * 0.022598,
        g * 0.053077 + b * 1.035763,
    );

    if xyz.x + xyz.y + xyz.z == 0.0 {
        return ChromaticityPoint::default();
    }

    let yxy = Yxy::<D65, f64>::from_color(xyz);
    let brightness = (yxy.luma * MAX_BRIGHTNESS).trunc().clamp(1.0, MAX_BRIGHTNESS) as u8;

    ChromaticityPoint {
        x: round4(yxy.x),
        y: round4(yxy.y),
        brightness,
    }
}

fn inverse_gamma(v: f64) -> f64 {
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 0.0005,
            "{actual} is not within 0.0005 of {expected}"
        );
    }

    #[test]
    fn pure_red() {
        let point = rgb_to_xy(ColorSample::new(255, 0, 0));
        assert_close(point.x, 0.7351);
        assert_close(point.y, 0.2650);
        assert_eq!(point.brightness, 59);
    }

    #[test]
    fn white_is_d65() {
        let point = rgb_to_xy(ColorSample::new(255, 255, 255));
        assert_close(point.x, 0.3127);
        assert_close(point.y, 0.3290);
        assert!(point.brightness >= 253);
    }

    #[test]
    fn black_is_degenerate() {
        let point = rgb_to_xy(ColorSample::new(0, 0, 0));
        assert_eq!(point.x, 0.0);
        assert_eq!(point.y, 0.0);
        assert_eq!(point.brightness, 0);
    }

    #[test]
    fn dim_colors_floor_at_one() {
        let point = rgb_to_xy(ColorSample::new(0, 0, 1));
        assert_eq!(point.brightness, 1);
        assert!(point.x > 0.0);
    }

    #[test]
    fn rounds_to_four_decimals() {
        let point = rgb_to_xy(ColorSample::new(12, 180, 77));
        assert_eq!(point.x, round4(point.x));
        assert_eq!(point.y, round4(point.y));
    }

    #[test]
    fn conversion_is_deterministic() {
        let sample = ColorSample::new(33, 66, 99);
        assert_eq!(rgb_to_xy(sample), rgb_to_xy(sample));
    }
}
