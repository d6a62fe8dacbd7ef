//! Multi-island artifact correction.
//!
//! Generative models occasionally render the reference character next to
//! the requested one. After background removal each character shows up as a
//! separate opaque island in the alpha channel; when more than one island of
//! meaningful size exists only the largest is kept.

use std::collections::HashSet;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbaImage};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Islands at or below this pixel count are treated as noise.
pub const DEFAULT_MIN_ISLAND_AREA: u32 = 5000;

/// Grayscale level above which a pixel is treated as background when an
/// image arrives without an alpha channel.
pub const LIGHT_BACKGROUND_THRESHOLD: u8 = 240;

/// An outer connected opaque region of an alpha channel. `area` counts the
/// region with its enclosed holes filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Island {
    pub label: u32,
    pub area: u32,
}

/// What [`isolate_largest_island`] did to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IslandOutcome {
    /// Zero or one island above the minimum area; image untouched.
    Unchanged { islands: usize },
    /// Several islands found; everything but the largest was cleared.
    KeptLargest { islands: usize, kept_area: u32 },
}

/// Convert to RGBA, deriving alpha from luminance when the source has none.
pub fn ensure_alpha(image: &DynamicImage) -> RgbaImage {
    if image.color().has_alpha() {
        return image.to_rgba8();
    }

    let gray = image.to_luma8();
    let mut rgba = image.to_rgba8();
    for (px, luma) in rgba.pixels_mut().zip(gray.pixels()) {
        if luma.0[0] > LIGHT_BACKGROUND_THRESHOLD {
            px.0[3] = 0;
        }
    }
    rgba
}

fn opaque_mask(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[3] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Mark transparent pixels that cannot reach the image border as opaque, so
/// a hole inside a character belongs to that character's region.
fn fill_holes(mask: &mut GrayImage) {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    // Background is 4-connected so it cannot leak through the diagonal
    // gaps that 8-connected foreground treats as closed.
    let background = connected_components(&*mask, Connectivity::Four, Luma([255u8]));

    let mut outside: HashSet<u32> = HashSet::new();
    for x in 0..width {
        outside.insert(background.get_pixel(x, 0).0[0]);
        outside.insert(background.get_pixel(x, height - 1).0[0]);
    }
    for y in 0..height {
        outside.insert(background.get_pixel(0, y).0[0]);
        outside.insert(background.get_pixel(width - 1, y).0[0]);
    }

    for (px, label) in mask.pixels_mut().zip(background.pixels()) {
        let label = label.0[0];
        if label != 0 && !outside.contains(&label) {
            px.0[0] = 255;
        }
    }
}

/// Label outer regions: opaque pixels plus any holes they enclose.
fn label_opaque_regions(image: &RgbaImage) -> ImageBuffer<Luma<u32>, Vec<u32>> {
    let mut mask = opaque_mask(image);
    fill_holes(&mut mask);
    connected_components(&mask, Connectivity::Eight, Luma([0u8]))
}

fn islands_from_labels(labels: &ImageBuffer<Luma<u32>, Vec<u32>>, min_area: u32) -> Vec<Island> {
    let mut areas: Vec<u32> = Vec::new();
    for label in labels.pixels().map(|p| p.0[0]).filter(|&l| l != 0) {
        let idx = label as usize;
        if areas.len() <= idx {
            areas.resize(idx + 1, 0);
        }
        areas[idx] += 1;
    }

    let mut islands: Vec<Island> = areas
        .iter()
        .enumerate()
        .filter(|&(_, &area)| area > min_area)
        .map(|(label, &area)| Island {
            label: label as u32,
            area,
        })
        .collect();
    islands.sort_by(|a, b| b.area.cmp(&a.area).then(a.label.cmp(&b.label)));
    islands
}

/// All 8-connected outer islands larger than `min_area`, largest first.
pub fn find_islands(image: &RgbaImage, min_area: u32) -> Vec<Island> {
    islands_from_labels(&label_opaque_regions(image), min_area)
}

/// Clear alpha everywhere except the largest island when more than one
/// island exceeds `min_area`. Detail inside the kept island's holes stays.
pub fn isolate_largest_island(image: &mut RgbaImage, min_area: u32) -> IslandOutcome {
    let labels = label_opaque_regions(image);
    let islands = islands_from_labels(&labels, min_area);

    if islands.len() <= 1 {
        return IslandOutcome::Unchanged {
            islands: islands.len(),
        };
    }

    let keep = islands[0];
    for (px, label) in image.pixels_mut().zip(labels.pixels()) {
        if label.0[0] != keep.label {
            px.0[3] = 0;
        }
    }

    IslandOutcome::KeptLargest {
        islands: islands.len(),
        kept_area: keep.area,
    }
}
