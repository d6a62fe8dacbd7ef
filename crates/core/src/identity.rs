//! Identity selection from face-detection results.
//!
//! Turns a decoded photo plus the faces reported by the face-analysis
//! capability into an [`Identity`]: the chosen face's bounding box, a
//! margin-padded crop, and a coarse skin-tone sample. Faces are ranked by
//! bounding-box area so index 0 is always the largest subject, which lets a
//! single photo of two people yield two identities by index.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Role;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Margin added on every side of the face box when cropping the identity
/// reference.
pub const FACE_CROP_MARGIN_PX: u32 = 50;

/// Half-size of the square window sampled around the face midpoint for the
/// skin-tone estimate (a 10x10 window).
pub const SKIN_SAMPLE_HALF_WINDOW: u32 = 5;

// ---------------------------------------------------------------------------
// Detection types
// ---------------------------------------------------------------------------

/// Axis-aligned face bounding box in source-image pixel coordinates.
///
/// Detectors may report boxes that extend past the image edges, so the
/// coordinates are kept as floats and clamped only when pixels are read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Midpoint of the box.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Clamp every coordinate into a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// Gender as reported by the face-analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

/// One face reported by the face-analysis capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age: Option<f32>,
}

/// Integer pixel rectangle fully contained in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Whether the rectangle lies entirely within a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x + self.width <= width && self.y + self.height <= height
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The reusable representation of one person extracted from a photo.
#[derive(Debug, Clone)]
pub struct Identity {
    pub role: Role,
    /// Reference to the photo this identity came from.
    pub source: String,
    pub face_bbox: BoundingBox,
    /// Region of the source image covered by [`Identity::crop`].
    pub crop_rect: PixelRect,
    pub crop: RgbImage,
    pub skin_tone: Rgb<u8>,
    pub gender: Option<Gender>,
    pub age: Option<f32>,
    /// Face embedding of the chosen face, when the detector provides one.
    pub embedding: Option<Vec<f32>>,
}

/// Serializable form of an [`Identity`], written as `identity.json` next to
/// the face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub role: Role,
    pub source: String,
    pub face_bbox: BoundingBox,
    pub crop_rect: PixelRect,
    pub skin_tone_hex: String,
    pub gender: Option<Gender>,
    pub age: Option<f32>,
    /// Path of the saved face crop, relative to the order directory.
    pub face_crop: String,
}

impl Identity {
    /// Skin tone as a `#rrggbb` string.
    pub fn skin_tone_hex(&self) -> String {
        let [r, g, b] = self.skin_tone.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn record(&self, face_crop: impl Into<String>) -> IdentityRecord {
        IdentityRecord {
            role: self.role.clone(),
            source: self.source.clone(),
            face_bbox: self.face_bbox,
            crop_rect: self.crop_rect,
            skin_tone_hex: self.skin_tone_hex(),
            gender: self.gender,
            age: self.age,
            face_crop: face_crop.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Order faces by bounding-box area, largest first. Ties keep detector order.
pub fn rank_faces(mut faces: Vec<DetectedFace>) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.bbox.area().total_cmp(&a.bbox.area()));
    faces
}

/// Pick the face at `face_index` from an already-ranked list.
pub fn select_face(ranked: &[DetectedFace], face_index: usize) -> Result<&DetectedFace, CoreError> {
    if ranked.is_empty() {
        return Err(CoreError::NoFaceDetected);
    }
    ranked.get(face_index).ok_or(CoreError::FaceIndexOutOfRange {
        index: face_index,
        count: ranked.len(),
    })
}

/// Expand `bbox` by `margin` on every side and clamp to the image.
///
/// Returns `None` when the clamped rectangle is empty (the box lies
/// entirely outside the image).
pub fn crop_rect(bbox: &BoundingBox, margin: u32, width: u32, height: u32) -> Option<PixelRect> {
    let margin = margin as f32;
    let x1 = (bbox.x1 - margin).floor().clamp(0.0, width as f32) as u32;
    let y1 = (bbox.y1 - margin).floor().clamp(0.0, height as f32) as u32;
    let x2 = (bbox.x2 + margin).ceil().clamp(0.0, width as f32) as u32;
    let y2 = (bbox.y2 + margin).ceil().clamp(0.0, height as f32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(PixelRect {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Mean colour of a small window centred on the face midpoint.
pub fn sample_skin_tone(image: &RgbImage, bbox: &BoundingBox) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    let (cx, cy) = bbox.center();
    let cx = (cx.max(0.0) as u32).min(width.saturating_sub(1));
    let cy = (cy.max(0.0) as u32).min(height.saturating_sub(1));

    let x_start = cx.saturating_sub(SKIN_SAMPLE_HALF_WINDOW);
    let y_start = cy.saturating_sub(SKIN_SAMPLE_HALF_WINDOW);
    let x_end = (cx + SKIN_SAMPLE_HALF_WINDOW).min(width).max(x_start + 1);
    let y_end = (cy + SKIN_SAMPLE_HALF_WINDOW).min(height).max(y_start + 1);

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for y in y_start..y_end {
        for x in x_start..x_end {
            let px = image.get_pixel(x, y);
            for (acc, channel) in sum.iter_mut().zip(px.0) {
                *acc += u64::from(channel);
            }
            count += 1;
        }
    }

    let mean = |total: u64| (total / count.max(1)) as u8;
    Rgb([mean(sum[0]), mean(sum[1]), mean(sum[2])])
}

/// Build an [`Identity`] for `role` from a decoded photo and its faces.
///
/// Fails with [`CoreError::NoFaceDetected`] for an empty face list and
/// [`CoreError::FaceIndexOutOfRange`] when `face_index` is past the end.
pub fn extract_identity(
    image: &DynamicImage,
    faces: Vec<DetectedFace>,
    role: Role,
    face_index: usize,
    source: impl Into<String>,
) -> Result<Identity, CoreError> {
    let ranked = rank_faces(faces);
    let face = select_face(&ranked, face_index)?;

    let (width, height) = image.dimensions();
    let rect = crop_rect(&face.bbox, FACE_CROP_MARGIN_PX, width, height).ok_or_else(|| {
        CoreError::Validation(format!(
            "Face {face_index} lies outside the {width}x{height} photo"
        ))
    })?;

    let rgb = image.to_rgb8();
    let skin_tone = sample_skin_tone(&rgb, &face.bbox);
    let crop = image::imageops::crop_imm(&rgb, rect.x, rect.y, rect.width, rect.height).to_image();

    tracing::debug!(
        role = %role,
        face_index,
        face_count = ranked.len(),
        face_width = face.bbox.width(),
        face_height = face.bbox.height(),
        "Selected face",
    );

    Ok(Identity {
        role,
        source: source.into(),
        face_bbox: face.bbox,
        crop_rect: rect,
        crop,
        skin_tone,
        gender: face.gender,
        age: face.age,
        embedding: face.embedding.clone(),
    })
}

/// Cosine similarity of two face embeddings.
///
/// `None` when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
