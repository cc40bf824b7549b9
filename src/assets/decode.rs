use anyhow::Context;
use image::imageops::FilterType;

use crate::foundation::{
    core::{PixelGrid, Rgb8},
    error::{CoverError, CoverResult},
};

/// Resampling kernel used when scaling artwork down to the matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    /// Pixelated look; the default.
    #[default]
    Nearest,
    #[serde(alias = "linear", alias = "bilinear")]
    Triangle,
    #[serde(alias = "cubic", alias = "catmull-rom")]
    CatmullRom,
    Gaussian,
    #[serde(alias = "lanczos")]
    Lanczos3,
}

impl Resample {
    fn filter(self) -> FilterType {
        match self {
            Resample::Nearest => FilterType::Nearest,
            Resample::Triangle => FilterType::Triangle,
            Resample::CatmullRom => FilterType::CatmullRom,
            Resample::Gaussian => FilterType::Gaussian,
            Resample::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Decode arbitrary image bytes into a `width` x `height` grid.
///
/// The image is scaled to fit (aspect ratio kept), centred, and padded with black. Transparent
/// areas are composited over black.
pub fn decode_cover(
    bytes: &[u8],
    width: u32,
    height: u32,
    resample: Resample,
) -> CoverResult<PixelGrid> {
    if width == 0 || height == 0 {
        return Err(CoverError::validation("target grid must be non-empty"));
    }
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let mut rgba = dyn_img.to_rgba8();
    let (src_w, src_h) = rgba.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(CoverError::decode("image has no pixels"));
    }
    premultiply_rgba8_in_place(&mut rgba);

    let scale = (f64::from(width) / f64::from(src_w)).min(f64::from(height) / f64::from(src_h));
    let scaled_w = ((f64::from(src_w) * scale).round() as u32).clamp(1, width);
    let scaled_h = ((f64::from(src_h) * scale).round() as u32).clamp(1, height);
    let left = ((f64::from(width - scaled_w)) / 2.0).round() as u32;
    let top = ((f64::from(height - scaled_h)) / 2.0).round() as u32;

    let resized = image::imageops::resize(&rgba, scaled_w, scaled_h, resample.filter());

    let mut grid = PixelGrid::new(width, height);
    for (x, y, px) in resized.enumerate_pixels() {
        grid.set(left + x, top + y, Rgb8::new(px[0], px[1], px[2]));
    }
    Ok(grid)
}

/// Premultiplied RGB is the colour over black.
fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}
