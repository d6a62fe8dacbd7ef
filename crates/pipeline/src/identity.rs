//! Identity Extractor service.
//!
//! Runs face detection through the [`FaceDetector`] capability, selects the
//! requested face, and persists the identity record and face crop into the
//! order workspace.

use std::sync::Arc;

use image::DynamicImage;
use pickabook_core::background::encode_png;
use pickabook_core::capabilities::{FaceDetector, ProviderError};
use pickabook_core::error::CoreError;
use pickabook_core::identity::{
    cosine_similarity, extract_identity, rank_faces, Identity, IdentityRecord,
};
use pickabook_core::retry::RetryPolicy;
use pickabook_core::types::Role;

use crate::workspace::{write_file, OrderWorkspace};

pub struct IdentityExtractor {
    detector: Arc<dyn FaceDetector>,
    retry: RetryPolicy,
}

impl IdentityExtractor {
    pub fn new(detector: Arc<dyn FaceDetector>, retry: RetryPolicy) -> Self {
        Self { detector, retry }
    }

    /// Extract the identity of the `face_index`-th largest face in `photo`.
    pub async fn extract(
        &self,
        photo: &[u8],
        role: Role,
        face_index: usize,
        source: &str,
    ) -> Result<Identity, CoreError> {
        let image = image::load_from_memory(photo).map_err(|e| {
            CoreError::Validation(format!("Photo for role '{role}' is not a decodable image: {e}"))
        })?;
        self.extract_decoded(&image, photo, role, face_index, source).await
    }

    /// Same as [`IdentityExtractor::extract`] for a photo that has already
    /// been decoded; `encoded` is what the face detector receives.
    pub async fn extract_decoded(
        &self,
        image: &DynamicImage,
        encoded: &[u8],
        role: Role,
        face_index: usize,
        source: &str,
    ) -> Result<Identity, CoreError> {
        let faces = self
            .retry
            .run("detect_faces", ProviderError::is_rate_limited, || {
                self.detector.detect_faces(encoded)
            })
            .await
            .map_err(|e| CoreError::Generation(format!("Face detection failed: {e}")))?;

        tracing::info!(role = %role, faces = faces.len(), face_index, "Faces detected");
        extract_identity(image, faces, role, face_index, source)
    }

    /// Cosine similarity between `identity` and the largest face in
    /// `generated`. `None` when either side lacks an embedding or the
    /// generated image shows no face.
    pub async fn similarity(
        &self,
        identity: &Identity,
        generated: &[u8],
    ) -> Result<Option<f32>, CoreError> {
        let Some(reference) = identity.embedding.as_deref() else {
            return Ok(None);
        };

        let faces = self
            .retry
            .run("detect_faces", ProviderError::is_rate_limited, || {
                self.detector.detect_faces(generated)
            })
            .await
            .map_err(|e| CoreError::Generation(format!("Face detection failed: {e}")))?;

        Ok(rank_faces(faces)
            .into_iter()
            .next()
            .and_then(|face| face.embedding)
            .and_then(|embedding| cosine_similarity(reference, &embedding)))
    }

    /// Write `identity.json` and the face crop for `identity`.
    pub async fn persist(
        &self,
        workspace: &OrderWorkspace,
        identity: &Identity,
    ) -> Result<IdentityRecord, CoreError> {
        let crop_path = workspace.face_crop_path(&identity.role);
        let crop_png = encode_png(&DynamicImage::ImageRgb8(identity.crop.clone()))?;
        write_file(&crop_path, &crop_png).await?;

        let record = identity.record(workspace.relative(&crop_path).to_string_lossy());
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| CoreError::Internal(format!("Serialize identity record: {e}")))?;
        write_file(&workspace.identity_record_path(&identity.role), &json).await?;

        Ok(record)
    }
}
