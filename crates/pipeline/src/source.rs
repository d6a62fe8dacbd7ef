//! Image reference normalization.
//!
//! Photos and generated outputs arrive as `file://` URLs, `http(s)://` URLs
//! or bare local paths. They are parsed once into an [`ImageSource`] and
//! read through a shared [`SourceReader`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use pickabook_core::error::CoreError;
use reqwest::Url;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid image reference '{0}'")]
    InvalidReference(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<SourceError> for CoreError {
    fn from(err: SourceError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// A normalized image location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Local(PathBuf),
    Remote(Url),
}

impl ImageSource {
    pub fn parse(reference: &str) -> Result<Self, SourceError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(SourceError::InvalidReference(reference.to_string()));
        }

        if let Some(scheme_end) = trimmed.find("://") {
            let url = Url::parse(trimmed)
                .map_err(|_| SourceError::InvalidReference(reference.to_string()))?;
            return match &trimmed[..scheme_end] {
                "file" => url
                    .to_file_path()
                    .map(Self::Local)
                    .map_err(|_| SourceError::InvalidReference(reference.to_string())),
                "http" | "https" => Ok(Self::Remote(url)),
                _ => Err(SourceError::InvalidReference(reference.to_string())),
            };
        }

        Ok(Self::Local(PathBuf::from(trimmed)))
    }

    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::Local(path.as_ref().to_path_buf())
    }
}

/// Upper bound on a single remote download, body included.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Reads image bytes from any [`ImageSource`].
#[derive(Clone)]
pub struct SourceReader {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for SourceReader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl SourceReader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn read(&self, source: &ImageSource) -> Result<Vec<u8>, SourceError> {
        match source {
            ImageSource::Local(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            ImageSource::Remote(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .timeout(self.timeout)
                    .send()
                    .await?;
                let bytes = response.error_for_status()?.bytes().await?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Parse and read a reference in one step.
    pub async fn fetch(&self, reference: &str) -> Result<Vec<u8>, SourceError> {
        self.read(&ImageSource::parse(reference)?).await
    }
}
