//! Capability traits for the external services the pipeline depends on.
//!
//! The generative model, the face-analysis service, background removal and
//! blob publication are opaque collaborators. The pipeline only talks to
//! them through these traits so concrete HTTP clients live in
//! `pickabook-inference`/`pickabook-cloud` and tests can substitute fakes.

use std::path::Path;

use async_trait::async_trait;
use tokio::time::error::Elapsed;

use crate::identity::DetectedFace;

/// Errors reported by an external capability.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider asked us to slow down.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A single attempt exceeded its time budget.
    #[error("Call timed out")]
    Timeout,

    /// Transport-level failure (connect, TLS, body read).
    #[error("Request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider's response could not be interpreted.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The call finished but produced nothing usable.
    #[error("Provider returned no output")]
    NoOutput,
}

impl ProviderError {
    /// Whether this error is a rate-limiting signal worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, body } => *status == 429 || mentions_throttling(body),
            Self::Request(msg) => mentions_throttling(msg),
            _ => false,
        }
    }
}

fn mentions_throttling(text: &str) -> bool {
    text.to_ascii_lowercase().contains("throttled")
}

impl From<Elapsed> for ProviderError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// One image-to-image generation call.
///
/// `reference_image` carries the pose/structure to keep and
/// `identity_image` the face to transfer. Both are encoded image bytes.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub reference_image: Vec<u8>,
    pub identity_image: Vec<u8>,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub style_strength: Option<f32>,
}

/// Externally-hosted generative model.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one generation and return a reference (URL) to the output image.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

// ---------------------------------------------------------------------------
// Face analysis / background removal
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect every face in the encoded image, in detector order.
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError>;
}

#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Return encoded image bytes with the background made transparent.
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// Optional blob publication for finished pages.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the file at `local_path` under `remote_path`.
    ///
    /// Returns the public URL, or `None` when this store is not configured
    /// to accept the upload.
    async fn upload(&self, local_path: &Path, remote_path: &str)
        -> Result<Option<String>, ProviderError>;
}
