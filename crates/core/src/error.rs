use std::path::PathBuf;

/// Errors raised by the storybook pipeline core.
///
/// Phase-1 and phase-2 generation failures never surface as this type to
/// the order level; every variant that reaches the pipeline controller is
/// fatal for the order and its display string becomes the recorded
/// failure reason.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No face detected in photo")]
    NoFaceDetected,

    #[error("Requested face index {index} but only {count} face(s) were detected")]
    FaceIndexOutOfRange { index: usize, count: usize },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Template asset missing: {}", .0.display())]
    TemplateAssetMissing(PathBuf),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
