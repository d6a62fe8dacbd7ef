//! Publication by copying into a directory served as static files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pickabook_core::capabilities::{BlobStore, ProviderError};

pub struct LocalBlobStore {
    public_dir: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// * `public_dir` - directory served at `base_url`.
    pub fn new(public_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            public_dir: public_dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn destination(&self, remote_path: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(remote_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ProviderError::Request(format!(
                "Refusing to publish outside the public directory: {remote_path}"
            )));
        }
        Ok(self.public_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<Option<String>, ProviderError> {
        let dest = self.destination(remote_path)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::Request(format!("Create {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| ProviderError::Request(format!("Copy to {}: {e}", dest.display())))?;

        Ok(Some(format!(
            "{}/{}",
            self.base_url,
            remote_path.trim_start_matches('/')
        )))
    }
}
