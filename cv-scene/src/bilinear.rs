//! Bilinear sampling of RGB images at sub-pixel locations.

use image::{Rgb, RgbImage};

fn blend_linear(px0: [f64; 3], px1: [f64; 3], x: f64) -> [f64; 3] {
    let mut outp = px0;
    for (i, channel) in outp.iter_mut().enumerate() {
        *channel = (1.0 - x) * px0[i] + x * px1[i];
    }
    outp
}

fn channels(&Rgb(rgb): &Rgb<u8>) -> [f64; 3] {
    rgb.map(f64::from)
}

/// Samples `image` at `(x, y)` where integer coordinates are pixel centers.
///
/// Returns `None` when any of the four surrounding pixels lies outside the image.
pub fn interpolate_bilinear(image: &RgbImage, x: f64, y: f64) -> Option<[f64; 3]> {
    let left = x.floor();
    let top = y.floor();
    let (width, height) = image.dimensions();
    if !(left >= 0.0 && top >= 0.0 && left + 1.0 < width as f64 && top + 1.0 < height as f64) {
        return None;
    }

    let x_weight = x - left;
    let y_weight = y - top;
    let (left, top) = (left as u32, top as u32);
    let row = |row: u32| {
        blend_linear(
            channels(image.get_pixel(left, row)),
            channels(image.get_pixel(left + 1, row)),
            x_weight,
        )
    };
    Some(blend_linear(row(top), row(top + 1), y_weight))
}
