//! HTTP client for a rembg-compatible background-removal service.
//!
//! `POST {base}/api/remove` with a multipart `file` field; the response body
//! is the cut-out PNG.

use async_trait::async_trait;
use pickabook_core::capabilities::{BackgroundRemover, ProviderError};
use reqwest::multipart::{Form, Part};

use crate::generator::sniff_content_type;
use crate::http::{ensure_success, transport_error};

pub struct HttpBackgroundRemover {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackgroundRemover {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/remove", self.base_url)
    }
}

#[async_trait]
impl BackgroundRemover for HttpBackgroundRemover {
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let part = Part::bytes(image.to_vec())
            .file_name("image")
            .mime_str(sniff_content_type(image))
            .map_err(transport_error)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;

        if bytes.is_empty() {
            return Err(ProviderError::NoOutput);
        }
        Ok(bytes.to_vec())
    }
}
