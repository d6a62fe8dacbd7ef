//! Wires concrete capability clients into a [`PipelineController`].

use std::sync::Arc;

use pickabook_cloud::{LocalBlobStore, S3BlobStore};
use pickabook_core::background::ColorKeyRemover;
use pickabook_core::capabilities::{BackgroundRemover, BlobStore};
use pickabook_db::DbPool;
use pickabook_inference::api::ReplicateApi;
use pickabook_inference::background::HttpBackgroundRemover;
use pickabook_inference::face::HttpFaceDetector;
use pickabook_inference::generator::{GeneratorConfig, ReplicateGenerator};
use pickabook_pipeline::assets::TemplateLibrary;
use pickabook_pipeline::identity::IdentityExtractor;
use pickabook_pipeline::orchestrator::GenerationOrchestrator;
use pickabook_pipeline::postprocess::PostProcessor;
use pickabook_pipeline::source::SourceReader;
use pickabook_pipeline::PipelineController;

use crate::config::WorkerConfig;
use crate::store::PgProgressStore;

/// Build the controller. Every HTTP call made through the shared client is
/// bounded by the generation timeout; downloads have their own tighter bound.
pub async fn build_controller(
    config: &WorkerConfig,
    pool: DbPool,
) -> Result<PipelineController, reqwest::Error> {
    let http = reqwest::Client::builder()
        .timeout(config.retry.call_timeout)
        .build()?;
    let reader = SourceReader::new(http.clone()).with_timeout(config.download_timeout);

    let api = ReplicateApi::with_client(
        http.clone(),
        &config.replicate.api_url,
        &config.replicate.token,
    );
    let generator = ReplicateGenerator::new(
        api,
        GeneratorConfig {
            model: config.replicate.model.clone(),
            ..GeneratorConfig::default()
        },
    );
    tracing::info!(model = %config.replicate.model, "Generation provider configured");

    let detector = HttpFaceDetector::with_client(http.clone(), &config.face_service_url);

    let remover: Arc<dyn BackgroundRemover> = match &config.background_removal_url {
        Some(url) => {
            tracing::info!(url = %url, "Using background-removal service");
            Arc::new(HttpBackgroundRemover::with_client(http.clone(), url))
        }
        None => {
            tracing::info!("BACKGROUND_REMOVAL_URL not set, using color-key remover");
            Arc::new(ColorKeyRemover::default())
        }
    };

    let mut publishers: Vec<Arc<dyn BlobStore>> = Vec::new();
    if let Some(s3) = &config.s3 {
        tracing::info!(bucket = %s3.bucket, "Publishing pages to S3");
        publishers.push(Arc::new(S3BlobStore::from_config(s3.clone()).await));
    }
    if let Some(local) = &config.local_publish {
        tracing::info!(public_dir = %local.public_dir.display(), "Publishing pages locally");
        publishers.push(Arc::new(LocalBlobStore::new(
            local.public_dir.clone(),
            local.base_url.clone(),
        )));
    }

    let post = PostProcessor::new(remover, config.retry.clone())
        .with_min_island_area(config.min_island_area);
    let orchestrator = GenerationOrchestrator::new(
        Arc::new(generator),
        post,
        reader.clone(),
        config.retry.clone(),
    );

    Ok(PipelineController::new(
        TemplateLibrary::new(config.assets_root.clone()),
        config.orders_root.clone(),
        IdentityExtractor::new(Arc::new(detector), config.retry.clone()),
        orchestrator,
        reader,
        publishers,
        Arc::new(PgProgressStore::new(pool)),
    )
    .with_photo_quality(config.photo_quality)
    .with_min_identity_similarity(config.min_identity_similarity))
}
