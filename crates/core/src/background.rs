//! Local background removal by colour keying.
//!
//! Used when no remote background-removal service is configured. The
//! top-left pixel is assumed to be background and every pixel close to it
//! becomes transparent.

use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::capabilities::{BackgroundRemover, ProviderError};
use crate::error::CoreError;

/// Default summed-RGB distance below which a pixel matches the key colour.
pub const DEFAULT_KEY_TOLERANCE: u32 = 30;

/// Encode an image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CoreError::Internal(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

/// Make every pixel within `tolerance` of the top-left colour transparent.
pub fn key_out_corner_color(image: &mut RgbaImage, tolerance: u32) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let key = *image.get_pixel(0, 0);
    for px in image.pixels_mut() {
        let dist: u32 = (0..3).map(|i| u32::from(px.0[i].abs_diff(key.0[i]))).sum();
        if dist < tolerance {
            px.0 = [255, 255, 255, 0];
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColorKeyRemover {
    tolerance: u32,
}

impl ColorKeyRemover {
    pub fn new(tolerance: u32) -> Self {
        Self { tolerance }
    }
}

impl Default for ColorKeyRemover {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_TOLERANCE)
    }
}

#[async_trait]
impl BackgroundRemover for ColorKeyRemover {
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let decoded =
            image::load_from_memory(image).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let mut rgba = decoded.to_rgba8();
        key_out_corner_color(&mut rgba, self.tolerance);
        encode_png(&DynamicImage::ImageRgba8(rgba)).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}
