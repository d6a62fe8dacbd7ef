//! HTTP client for the face-analysis service.
//!
//! The service exposes `POST /detect` taking a multipart `image` field and
//! answering with every detected face:
//!
//! ```json
//! {"faces": [{"bbox": [x1, y1, x2, y2], "score": 0.98,
//!             "gender": "female", "age": 34.0, "embedding": [...]}]}
//! ```

use async_trait::async_trait;
use pickabook_core::capabilities::{FaceDetector, ProviderError};
use pickabook_core::identity::{BoundingBox, DetectedFace, Gender};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::generator::sniff_content_type;
use crate::http::{ensure_success, transport_error};

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub faces: Vec<RawFace>,
}

#[derive(Debug, Deserialize)]
pub struct RawFace {
    pub bbox: [f32; 4],
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub gender: Option<serde_json::Value>,
    #[serde(default)]
    pub age: Option<f32>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Interpret the service's gender field: `"female"`/`"F"`/`0` or
/// `"male"`/`"M"`/`1`.
pub fn parse_gender(value: &serde_json::Value) -> Option<Gender> {
    match value {
        serde_json::Value::String(s) => match s.to_ascii_lowercase().chars().next()? {
            'f' => Some(Gender::Female),
            'm' => Some(Gender::Male),
            _ => None,
        },
        serde_json::Value::Number(n) => match n.as_i64()? {
            0 => Some(Gender::Female),
            1 => Some(Gender::Male),
            _ => None,
        },
        _ => None,
    }
}

impl From<RawFace> for DetectedFace {
    fn from(raw: RawFace) -> Self {
        let [x1, y1, x2, y2] = raw.bbox;
        DetectedFace {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            score: raw.score.unwrap_or(0.0),
            embedding: raw.embedding,
            gender: raw.gender.as_ref().and_then(parse_gender),
            age: raw.age,
        }
    }
}

pub struct HttpFaceDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaceDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        let part = Part::bytes(image.to_vec())
            .file_name("photo")
            .mime_str(sniff_content_type(image))
            .map_err(transport_error)?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let body: DetectResponse = response.json().await.map_err(transport_error)?;

        tracing::debug!(faces = body.faces.len(), "Face detection finished");
        Ok(body.faces.into_iter().map(DetectedFace::from).collect())
    }
}
