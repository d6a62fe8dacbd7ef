//! S3-compatible blob publication.

use std::path::Path;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use pickabook_core::capabilities::{BlobStore, ProviderError};

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, Supabase).
    pub endpoint: Option<String>,
    /// Static credentials; when absent the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Public URL prefix for uploaded objects. Defaults to the virtual-host
    /// style AWS URL, or `<endpoint>/<bucket>` with a custom endpoint.
    pub public_base_url: Option<String>,
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub async fn from_config(config: S3Config) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "pickabook-env",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let public_base_url = public_base_url(&config);
        Self::with_client(Client::from_conf(builder.build()), config.bucket, public_base_url)
    }

    pub fn with_client(client: Client, bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }
}

fn public_base_url(config: &S3Config) -> String {
    match (&config.public_base_url, &config.endpoint) {
        (Some(url), _) => url.clone(),
        (None, Some(endpoint)) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        (None, None) => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<Option<String>, ProviderError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| ProviderError::Request(format!("Read {}: {e}", local_path.display())))?;
        let key = remote_path.trim_start_matches('/');

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("S3 upload of {key} failed: {e}")))?;

        let url = self.object_url(key);
        tracing::info!(bucket = %self.bucket, key, url = %url, "Uploaded page to S3");
        Ok(Some(url))
    }
}
