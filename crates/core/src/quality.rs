//! Upload quality gate: resolution and sharpness of a user photo.
//!
//! Sharpness is the variance of the Laplacian of the grayscale image; a
//! blurry or flat photo has few edges and scores low.

use image::{DynamicImage, GenericImageView, GrayImage};
use imageproc::filter::laplacian_filter;

use crate::error::CoreError;
use crate::types::Role;

/// Shortest side a photo may have.
pub const DEFAULT_MIN_PHOTO_DIMENSION: u32 = 500;

/// Lowest accepted Laplacian variance.
pub const DEFAULT_MIN_SHARPNESS: f64 = 100.0;

/// Thresholds for [`PhotoQuality::check`]. A zero threshold disables that
/// check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoQuality {
    pub min_dimension: u32,
    pub min_sharpness: f64,
}

impl Default for PhotoQuality {
    fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_PHOTO_DIMENSION,
            min_sharpness: DEFAULT_MIN_SHARPNESS,
        }
    }
}

impl PhotoQuality {
    /// Accept every decodable photo.
    pub fn disabled() -> Self {
        Self {
            min_dimension: 0,
            min_sharpness: 0.0,
        }
    }

    /// Reject `image` when it is too small or too blurry. Every failed check
    /// is listed in the error.
    pub fn check(&self, role: &Role, image: &DynamicImage) -> Result<(), CoreError> {
        let mut problems = Vec::new();

        let (width, height) = image.dimensions();
        let min_side = width.min(height);
        if min_side < self.min_dimension {
            problems.push(format!(
                "Low resolution ({min_side}px < {}px)",
                self.min_dimension
            ));
        }

        if self.min_sharpness > 0.0 {
            let score = sharpness(&image.to_luma8());
            tracing::debug!(role = %role, sharpness = score, width, height, "Photo quality measured");
            if score < self.min_sharpness {
                problems.push(format!(
                    "Image is too blurry (sharpness {score:.0} < {:.0})",
                    self.min_sharpness
                ));
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        Err(CoreError::Validation(format!(
            "Photo for role '{role}' rejected: {}",
            problems.join("; ")
        )))
    }
}

/// Variance of the Laplacian response over the whole image.
pub fn sharpness(gray: &GrayImage) -> f64 {
    let response = laplacian_filter(gray);
    let count = response.pixels().len();
    if count == 0 {
        return 0.0;
    }

    let (sum, sum_sq) = response.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = f64::from(p.0[0]);
        (s + v, sq + v * v)
    });
    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}
