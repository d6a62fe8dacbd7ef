//! Deterministic slot-based page compositor.
//!
//! Given a background, a slot list and a `role -> character` map, draws
//! every character whose role has a slot onto the background in ascending
//! z-order, blending with the character's own alpha channel.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::CoreError;
use crate::template::{ScaleMode, Slot, SlotRect};
use crate::types::Role;

/// Alpha at or below which border pixels are trimmed before fit-height
/// placement.
pub const TRIM_ALPHA_THRESHOLD: u8 = 50;

/// Where and how large a character is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Compute the placement of a `char_w` x `char_h` image inside `slot`.
pub fn placement(
    slot: &SlotRect,
    mode: ScaleMode,
    char_w: u32,
    char_h: u32,
) -> Result<Placement, CoreError> {
    if slot.is_empty() {
        return Err(CoreError::Composition(format!(
            "Slot at ({}, {}) has zero area ({}x{})",
            slot.x, slot.y, slot.w, slot.h
        )));
    }
    if char_w == 0 || char_h == 0 {
        return Err(CoreError::Composition(
            "Character image has zero area".to_string(),
        ));
    }

    match mode {
        ScaleMode::ExactFill => Ok(Placement {
            x: i64::from(slot.x),
            y: i64::from(slot.y),
            width: slot.w,
            height: slot.h,
        }),
        ScaleMode::FitHeight => {
            let mut scale = f64::from(slot.h) / f64::from(char_h);
            if f64::from(char_w) * scale > f64::from(slot.w) {
                scale = f64::from(slot.w) / f64::from(char_w);
            }
            let width = ((f64::from(char_w) * scale).round() as u32).clamp(1, slot.w);
            let height = ((f64::from(char_h) * scale).round() as u32).clamp(1, slot.h);

            Ok(Placement {
                x: i64::from(slot.x) + i64::from((slot.w - width) / 2),
                y: slot.bottom() - i64::from(height),
                width,
                height,
            })
        }
    }
}

/// Crop away border rows and columns whose alpha is at or below
/// `threshold`. Fully transparent images are returned unchanged.
pub fn trim_transparent_borders(image: &RgbaImage, threshold: u8) -> RgbaImage {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut found = false;

    for (x, y, px) in image.enumerate_pixels() {
        if px.0[3] > threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !found {
        return image.clone();
    }
    imageops::crop_imm(image, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image()
}

/// Draw `characters` onto a copy of `background` according to `slots`.
///
/// Slots whose role has no character are skipped. Ties in `z_index` keep
/// their declaration order.
pub fn composite(
    background: &RgbaImage,
    slots: &[Slot],
    characters: &HashMap<Role, RgbaImage>,
) -> Result<RgbaImage, CoreError> {
    let mut canvas = background.clone();

    let mut ordered: Vec<&Slot> = slots.iter().collect();
    ordered.sort_by_key(|slot| slot.z_index);

    for slot in ordered {
        let Some(character) = characters.get(&slot.role) else {
            tracing::debug!(role = %slot.role, slot_id = %slot.slot_id, "No character for slot, skipping");
            continue;
        };

        if slot.rotation_deg != 0.0 {
            tracing::warn!(
                slot_id = %slot.slot_id,
                rotation_deg = slot.rotation_deg,
                "Slot rotation is not applied",
            );
        }

        let source = match slot.scale_mode {
            ScaleMode::FitHeight => trim_transparent_borders(character, TRIM_ALPHA_THRESHOLD),
            ScaleMode::ExactFill => character.clone(),
        };
        let place = placement(&slot.bbox, slot.scale_mode, source.width(), source.height())?;
        let resized = imageops::resize(&source, place.width, place.height, FilterType::Lanczos3);
        imageops::overlay(&mut canvas, &resized, place.x, place.y);
    }

    Ok(canvas)
}
