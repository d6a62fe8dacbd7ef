//! Generation Orchestrator: the two-phase master/page protocol.
//!
//! Phase 1 renders one canonical master character per role from the user's
//! photo. Phase 2 re-poses the master for a specific page. Neither phase
//! raises: Phase 1 falls back to the raw photo and Phase 2 to `None`, and
//! the controller's fallback chain takes it from there.

use std::path::Path;
use std::sync::Arc;

use pickabook_core::capabilities::{GenerationProvider, GenerationRequest, ProviderError};
use pickabook_core::error::CoreError;
use pickabook_core::fallback::{CharacterAsset, CharacterTier};
use pickabook_core::identity::Identity;
use pickabook_core::prompt::BookPrompts;
use pickabook_core::retry::RetryPolicy;

use crate::postprocess::PostProcessor;
use crate::source::{ImageSource, SourceReader};
use crate::workspace::{remove_if_exists, write_file, OrderWorkspace};

pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    post: PostProcessor,
    reader: SourceReader,
    retry: RetryPolicy,
}

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        post: PostProcessor,
        reader: SourceReader,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            post,
            reader,
            retry,
        }
    }

    // ---- Phase 1 ----

    /// Generate the master character for `identity`.
    ///
    /// Uses `master_reference` for pose and structure, or the user photo
    /// itself when the template has none. Returns the raw photo as a
    /// [`CharacterTier::RawPhoto`] asset on any failure.
    pub async fn generate_master(
        &self,
        workspace: &OrderWorkspace,
        identity: &Identity,
        user_photo: &Path,
        master_reference: Option<&Path>,
        prompts: &BookPrompts,
    ) -> CharacterAsset {
        let role = &identity.role;
        let output = workspace.master_path(role);
        let reference = master_reference.unwrap_or(user_photo);

        let result = async {
            let request = GenerationRequest {
                reference_image: read_local(reference).await?,
                identity_image: read_local(user_photo).await?,
                prompt: prompts.master(role, &identity.skin_tone_hex()),
                negative_prompt: non_empty(&prompts.negative_prompt),
                style_strength: Some(prompts.style_strength),
            };
            self.generate_to(&request, &output).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    order_id = %workspace.order_id(),
                    role = %role,
                    reused_photo_as_reference = master_reference.is_none(),
                    "Master character generated",
                );
                CharacterAsset::new(CharacterTier::Master, output)
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %workspace.order_id(),
                    role = %role,
                    error = %e,
                    "Master generation failed, using raw photo",
                );
                CharacterAsset::new(CharacterTier::RawPhoto, user_photo)
            }
        }
    }

    // ---- Phase 2 ----

    /// Generate the page-specific variant of `master` posed like
    /// `page_reference`. Any earlier output for the same page and role is
    /// deleted first. Returns `None` on failure.
    pub async fn generate_page(
        &self,
        workspace: &OrderWorkspace,
        identity: &Identity,
        master: &CharacterAsset,
        page_reference: &Path,
        page_id: &str,
        prompts: &BookPrompts,
    ) -> Option<CharacterAsset> {
        let role = &identity.role;
        let output = workspace.page_variant_path(page_id, role);

        let result = async {
            remove_if_exists(&output).await?;
            let request = GenerationRequest {
                reference_image: read_local(page_reference).await?,
                identity_image: read_local(&master.path).await?,
                prompt: prompts.page(role, &identity.skin_tone_hex()),
                negative_prompt: non_empty(&prompts.negative_prompt),
                style_strength: Some(prompts.style_strength),
            };
            self.generate_to(&request, &output).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    order_id = %workspace.order_id(),
                    role = %role,
                    page_id,
                    master_tier = %master.tier,
                    "Page character generated",
                );
                Some(CharacterAsset::new(CharacterTier::PageVariant, output))
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %workspace.order_id(),
                    role = %role,
                    page_id,
                    error = %e,
                    "Page generation failed, master will be used",
                );
                None
            }
        }
    }

    // ---- private helpers ----

    /// Call the provider (with retry), download the result, post-process
    /// it and write it to `output`.
    async fn generate_to(&self, request: &GenerationRequest, output: &Path) -> Result<(), CoreError> {
        let url = self
            .retry
            .run("generate", ProviderError::is_rate_limited, || {
                self.provider.generate(request)
            })
            .await
            .map_err(|e| CoreError::Generation(e.to_string()))?;

        let raw = self
            .reader
            .read(&ImageSource::parse(&url).map_err(|e| CoreError::Generation(e.to_string()))?)
            .await
            .map_err(|e| CoreError::Generation(format!("Download of {url} failed: {e}")))?;
        image::load_from_memory(&raw)
            .map_err(|e| CoreError::Generation(format!("Output {url} is not an image: {e}")))?;

        let cleaned = self.post.clean(&raw).await;
        write_file(output, &cleaned).await
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, CoreError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::Storage(format!("Read {}: {e}", path.display())))
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}
