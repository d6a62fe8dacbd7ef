//! REST API client for the Replicate HTTP endpoints.
//!
//! Wraps file upload, prediction creation and prediction lookup using
//! [`reqwest`]. Higher-level generation logic lives in
//! [`crate::generator`].

use pickabook_core::capabilities::ProviderError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::predictions::Prediction;

pub const DEFAULT_API_URL: &str = "https://api.replicate.com";

/// HTTP client for the Replicate API.
#[derive(Clone)]
pub struct ReplicateApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// Response of `POST /v1/files`.
#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub urls: FileUrls,
}

#[derive(Debug, Deserialize)]
pub struct FileUrls {
    /// URL the model can fetch the file from.
    pub get: String,
}

/// Errors from the Replicate REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Replicate returned a non-2xx status code.
    #[error("Replicate API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl From<ReplicateApiError> for ProviderError {
    fn from(err: ReplicateApiError) -> Self {
        match err {
            ReplicateApiError::Request(e) => crate::http::transport_error(e),
            ReplicateApiError::ApiError { status: 429, body } => ProviderError::RateLimited(body),
            ReplicateApiError::ApiError { status, body } => ProviderError::Api { status, body },
        }
    }
}

impl ReplicateApi {
    /// * `api_url` - Base HTTP URL, e.g. `https://api.replicate.com`.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Upload an input file so it can be referenced by URL in a prediction.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadedFile, ReplicateApiError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new().part("content", part);

        let response = self
            .client
            .post(format!("{}/v1/files", self.api_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Create a prediction and wait (server-side, bounded by Replicate) for
    /// it to finish.
    ///
    /// `model` is either `owner/name` (latest version, via the models
    /// endpoint) or `owner/name:version`.
    pub async fn create_prediction(
        &self,
        model: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, ReplicateApiError> {
        let (url, body) = match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/v1/predictions", self.api_url),
                serde_json::json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/v1/models/{}/predictions", self.api_url, model),
                serde_json::json!({ "input": input }),
            ),
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current state of a prediction.
    pub async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateApiError> {
        let response = self
            .client
            .get(format!("{}/v1/predictions/{}", self.api_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ReplicateApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReplicateApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ReplicateApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
