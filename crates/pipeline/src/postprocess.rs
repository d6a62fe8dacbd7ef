//! Post-Processor: background removal followed by island correction.
//!
//! Never fails. Any error along the way returns the input bytes unchanged
//! so a generation that produced something usable is not thrown away.

use std::sync::Arc;

use image::DynamicImage;
use pickabook_core::artifact::{ensure_alpha, isolate_largest_island, IslandOutcome, DEFAULT_MIN_ISLAND_AREA};
use pickabook_core::background::encode_png;
use pickabook_core::capabilities::{BackgroundRemover, ProviderError};
use pickabook_core::error::CoreError;
use pickabook_core::retry::RetryPolicy;

pub struct PostProcessor {
    remover: Arc<dyn BackgroundRemover>,
    retry: RetryPolicy,
    min_island_area: u32,
}

impl PostProcessor {
    pub fn new(remover: Arc<dyn BackgroundRemover>, retry: RetryPolicy) -> Self {
        Self {
            remover,
            retry,
            min_island_area: DEFAULT_MIN_ISLAND_AREA,
        }
    }

    pub fn with_min_island_area(mut self, area: u32) -> Self {
        self.min_island_area = area;
        self
    }

    /// Remove the background and keep only the dominant character.
    pub async fn clean(&self, raw: &[u8]) -> Vec<u8> {
        match self.try_clean(raw).await {
            Ok(cleaned) => cleaned,
            Err(e) => {
                tracing::warn!(error = %e, "Post-processing failed, keeping raw output");
                raw.to_vec()
            }
        }
    }

    async fn try_clean(&self, raw: &[u8]) -> Result<Vec<u8>, CoreError> {
        let removed = self
            .retry
            .run("remove_background", ProviderError::is_rate_limited, || {
                self.remover.remove_background(raw)
            })
            .await
            .map_err(|e| CoreError::Generation(format!("Background removal failed: {e}")))?;

        let decoded = image::load_from_memory(&removed)
            .map_err(|e| CoreError::Composition(format!("Decode background-removed image: {e}")))?;
        let mut rgba = ensure_alpha(&decoded);

        match isolate_largest_island(&mut rgba, self.min_island_area) {
            IslandOutcome::Unchanged { islands } => {
                tracing::debug!(islands, "No island correction needed");
            }
            IslandOutcome::KeptLargest { islands, kept_area } => {
                tracing::info!(islands, kept_area, "Multiple characters detected, kept largest");
            }
        }

        encode_png(&DynamicImage::ImageRgba8(rgba))
    }
}
