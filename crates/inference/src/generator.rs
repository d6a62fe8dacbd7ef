//! [`GenerationProvider`] backed by a Replicate-hosted image model.
//!
//! Input images are uploaded through the files API and passed to the model
//! as `[identity, reference]`, so prompts can refer to them as "Image 1"
//! and "Image 2".

use async_trait::async_trait;
use pickabook_core::capabilities::{GenerationProvider, GenerationRequest, ProviderError};

use crate::api::ReplicateApi;
use crate::poll::{wait_for_prediction, PollConfig};
use crate::predictions::PredictionStatus;

pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-image";

/// Appended to every prompt; the book pages use portrait character art.
pub const PORTRAIT_SUFFIX: &str = " (Vertical Portrait Layout, 3:4 Aspect Ratio)";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// `owner/name` or `owner/name:version`.
    pub model: String,
    pub aspect_ratio: String,
    pub output_format: String,
    /// Model input key receiving `style_strength`, if the model has one.
    pub strength_key: Option<String>,
    /// Model input key receiving the negative prompt, if the model has one.
    pub negative_prompt_key: Option<String>,
    pub poll: PollConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: "3:4".to_string(),
            output_format: "png".to_string(),
            strength_key: None,
            negative_prompt_key: None,
            poll: PollConfig::default(),
        }
    }
}

pub struct ReplicateGenerator {
    api: ReplicateApi,
    config: GeneratorConfig,
}

impl ReplicateGenerator {
    pub fn new(api: ReplicateApi, config: GeneratorConfig) -> Self {
        Self { api, config }
    }

    async fn upload(&self, bytes: &[u8], name: &str) -> Result<String, ProviderError> {
        let content_type = sniff_content_type(bytes);
        let file = self.api.upload_file(bytes.to_vec(), name, content_type).await?;
        Ok(file.urls.get)
    }
}

/// Build the model input object for one request.
pub fn build_input(
    config: &GeneratorConfig,
    identity_url: &str,
    reference_url: &str,
    request: &GenerationRequest,
) -> serde_json::Value {
    let mut input = serde_json::json!({
        "image_input": [identity_url, reference_url],
        "prompt": format!("{}{}", request.prompt, PORTRAIT_SUFFIX),
        "aspect_ratio": config.aspect_ratio,
        "output_format": config.output_format,
    });

    if let (Some(key), Some(strength)) = (&config.strength_key, request.style_strength) {
        input[key.as_str()] = serde_json::json!(strength);
    }
    if let (Some(key), Some(negative)) = (&config.negative_prompt_key, &request.negative_prompt) {
        if !negative.is_empty() {
            input[key.as_str()] = serde_json::json!(negative);
        }
    }
    input
}

/// Best-effort MIME type from magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl GenerationProvider for ReplicateGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let identity_url = self.upload(&request.identity_image, "identity.png").await?;
        let reference_url = self.upload(&request.reference_image, "reference.png").await?;
        let input = build_input(&self.config, &identity_url, &reference_url, request);

        let created = self.api.create_prediction(&self.config.model, &input).await?;
        tracing::info!(
            prediction_id = %created.id,
            model = %self.config.model,
            status = ?created.status,
            "Prediction created",
        );

        let prediction = wait_for_prediction(&self.api, created, &self.config.poll).await?;
        match prediction.status {
            PredictionStatus::Succeeded => prediction.output_url().ok_or(ProviderError::NoOutput),
            _ => {
                let message = prediction.error_message();
                tracing::warn!(prediction_id = %prediction.id, error = %message, "Prediction did not succeed");
                if message.to_ascii_lowercase().contains("throttled") {
                    Err(ProviderError::RateLimited(message))
                } else {
                    Err(ProviderError::Request(format!(
                        "Prediction {} {:?}: {message}",
                        prediction.id, prediction.status
                    )))
                }
            }
        }
    }
}
