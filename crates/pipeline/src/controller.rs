//! Pipeline Controller: drives one order through its state machine.
//!
//! `QUEUED -> VALIDATING -> GENERATING -> COMPOSITING -> COMPLETED`, or
//! `FAILED` with the error's message. Pages already recorded in the
//! [`ProgressStore`] are never regenerated, so a failed order can be
//! re-queued and resumes from its first incomplete page.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use image::{DynamicImage, RgbaImage};
use pickabook_core::artifact::ensure_alpha;
use pickabook_core::background::encode_png;
use pickabook_core::capabilities::BlobStore;
use pickabook_core::compositor::composite;
use pickabook_core::error::CoreError;
use pickabook_core::fallback::{CharacterAsset, CharacterTier, FallbackChain};
use pickabook_core::identity::Identity;
use pickabook_core::order::OrderState;
use pickabook_core::quality::PhotoQuality;
use pickabook_core::template::{PageTemplate, TemplateRef};
use pickabook_core::types::{OrderId, Role};
use reqwest::Url;
use serde::Serialize;

use crate::assets::{load_background, BookTemplate, TemplateLibrary};
use crate::identity::IdentityExtractor;
use crate::orchestrator::GenerationOrchestrator;
use crate::source::{ImageSource, SourceReader};
use crate::store::{PageRecord, ProgressStore};
use crate::workspace::{exists, write_file, OrderWorkspace};

// ---------------------------------------------------------------------------
// Job and report types
// ---------------------------------------------------------------------------

/// One uploaded photo and the role it portrays.
#[derive(Debug, Clone)]
pub struct PhotoInput {
    pub role: Role,
    /// `file://` URL, `http(s)://` URL or local path.
    pub reference: String,
    /// Which face to use, largest first.
    pub face_index: usize,
}

/// Everything the controller needs to process an order.
#[derive(Debug, Clone)]
pub struct OrderJob {
    pub order_id: OrderId,
    pub template: TemplateRef,
    pub photos: Vec<PhotoInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page_number: u32,
    pub page_id: String,
    pub image_url: String,
    pub tiers: BTreeMap<Role, CharacterTier>,
}

/// Outcome of one controller run.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    pub order_id: OrderId,
    pub state: OrderState,
    /// Pages composited during this run.
    pub pages: Vec<PageReport>,
    /// Pages that were already recorded before this run.
    pub skipped_pages: Vec<u32>,
    /// Face similarity between each photo and its generated master.
    pub identity_scores: BTreeMap<Role, f32>,
    pub failure_reason: Option<String>,
}

impl OrderReport {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            state: OrderState::Queued,
            pages: Vec::new(),
            skipped_pages: Vec::new(),
            identity_scores: BTreeMap::new(),
            failure_reason: None,
        }
    }
}

/// A validated person on the order.
struct Subject {
    identity: Identity,
    /// The decoded upload, re-encoded as PNG inside the workspace.
    photo_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct PipelineController {
    library: TemplateLibrary,
    orders_root: PathBuf,
    extractor: IdentityExtractor,
    orchestrator: GenerationOrchestrator,
    reader: SourceReader,
    publishers: Vec<Arc<dyn BlobStore>>,
    store: Arc<dyn ProgressStore>,
    quality: PhotoQuality,
    min_identity_similarity: f32,
}

impl PipelineController {
    /// `publishers` are tried in order; the first to return a URL wins.
    /// With none (or none accepting) the page's `file://` URL is recorded.
    pub fn new(
        library: TemplateLibrary,
        orders_root: impl Into<PathBuf>,
        extractor: IdentityExtractor,
        orchestrator: GenerationOrchestrator,
        reader: SourceReader,
        publishers: Vec<Arc<dyn BlobStore>>,
        store: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            library,
            orders_root: orders_root.into(),
            extractor,
            orchestrator,
            reader,
            publishers,
            store,
            quality: PhotoQuality::disabled(),
            min_identity_similarity: 0.0,
        }
    }

    /// Reject photos below these thresholds during validation. Off unless
    /// set.
    pub fn with_photo_quality(mut self, quality: PhotoQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Warn when a generated master's face similarity to its photo falls
    /// below `threshold`. The master is still used.
    pub fn with_min_identity_similarity(mut self, threshold: f32) -> Self {
        self.min_identity_similarity = threshold;
        self
    }

    /// Process `job` to completion or failure.
    ///
    /// Pipeline errors do not surface as `Err`; they mark the order
    /// `FAILED` and are reported in [`OrderReport::failure_reason`]. `Err`
    /// is returned only when the failure itself cannot be recorded.
    pub async fn run(&self, job: &OrderJob) -> Result<OrderReport, CoreError> {
        let order_id = job.order_id;
        let mut report = OrderReport::new(order_id);

        match self.execute(job, &mut report).await {
            Ok(()) => {
                tracing::info!(
                    order_id = %order_id,
                    composited = report.pages.len(),
                    skipped = report.skipped_pages.len(),
                    "Order completed",
                );
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(order_id = %order_id, error = %e, "Order failed");
                report.state.validate_transition(OrderState::Failed)?;
                self.store
                    .set_state(order_id, OrderState::Failed, Some(&reason))
                    .await?;
                report.state = OrderState::Failed;
                report.failure_reason = Some(reason);
            }
        }
        Ok(report)
    }

    async fn execute(&self, job: &OrderJob, report: &mut OrderReport) -> Result<(), CoreError> {
        let order_id = job.order_id;
        let book = self.library.load_book(&job.template).await?;

        let completed = self.store.completed_pages(order_id).await?;
        let (done, pending): (Vec<&PageTemplate>, Vec<&PageTemplate>) = book
            .pages
            .iter()
            .partition(|page| completed.contains(&page.page_number));
        report.skipped_pages = done.iter().map(|p| p.page_number).collect();

        if pending.is_empty() {
            tracing::info!(order_id = %order_id, "All pages already composited");
            return self.transition(report, OrderState::Completed).await;
        }

        let workspace = OrderWorkspace::new(&self.orders_root, order_id);

        self.transition(report, OrderState::Validating).await?;
        let subjects = self.validate(&workspace, job).await?;

        self.transition(report, OrderState::Generating).await?;
        let masters = self.generate_masters(&workspace, &book, &subjects).await;
        report.identity_scores = self.verify_masters(job.order_id, &subjects, &masters).await;
        let variants = self
            .generate_page_variants(&workspace, &book, &pending, &subjects, &masters)
            .await;

        self.transition(report, OrderState::Compositing).await?;
        for page in pending {
            let page_report = self
                .composite_page(&workspace, page, &subjects, &masters, &variants)
                .await?;
            report.pages.push(page_report);
        }

        self.transition(report, OrderState::Completed).await
    }

    /// Move this run to `state`. A run starts from `queued` whatever the
    /// stored row says, so resumed orders walk the same path.
    async fn transition(&self, report: &mut OrderReport, state: OrderState) -> Result<(), CoreError> {
        report.state.validate_transition(state)?;
        tracing::info!(
            order_id = %report.order_id,
            from = %report.state,
            state = %state,
            "Order state changed",
        );
        self.store.set_state(report.order_id, state, None).await?;
        report.state = state;
        Ok(())
    }

    // ---- VALIDATING ----

    async fn validate(
        &self,
        workspace: &OrderWorkspace,
        job: &OrderJob,
    ) -> Result<BTreeMap<Role, Subject>, CoreError> {
        if job.photos.is_empty() {
            return Err(CoreError::Validation("Order has no photos".to_string()));
        }

        let mut subjects = BTreeMap::new();
        for photo in &job.photos {
            if subjects.contains_key(&photo.role) {
                return Err(CoreError::Validation(format!(
                    "More than one photo for role '{}'",
                    photo.role
                )));
            }

            let source = ImageSource::parse(&photo.reference)?;
            let bytes = self.reader.read(&source).await?;
            let image = image::load_from_memory(&bytes).map_err(|e| {
                CoreError::Validation(format!(
                    "Photo for role '{}' is not a decodable image: {e}",
                    photo.role
                ))
            })?;
            self.quality.check(&photo.role, &image)?;

            let identity = self
                .extractor
                .extract_decoded(&image, &bytes, photo.role.clone(), photo.face_index, &photo.reference)
                .await?;
            self.extractor.persist(workspace, &identity).await?;

            let photo_path = workspace.photo_path(&photo.role);
            write_file(&photo_path, &encode_png(&image)?).await?;

            subjects.insert(photo.role.clone(), Subject { identity, photo_path });
        }
        Ok(subjects)
    }

    // ---- GENERATING ----

    async fn generate_masters(
        &self,
        workspace: &OrderWorkspace,
        book: &BookTemplate,
        subjects: &BTreeMap<Role, Subject>,
    ) -> HashMap<Role, CharacterAsset> {
        let jobs = subjects.iter().map(|(role, subject)| async move {
            let master_reference = book.master_reference(role).await;
            let asset = self
                .orchestrator
                .generate_master(
                    workspace,
                    &subject.identity,
                    &subject.photo_path,
                    master_reference.as_deref(),
                    &book.prompts,
                )
                .await;
            (role.clone(), asset)
        });
        join_all(jobs).await.into_iter().collect()
    }

    /// Score each generated master against its photo. Scoring never fails
    /// the order.
    async fn verify_masters(
        &self,
        order_id: OrderId,
        subjects: &BTreeMap<Role, Subject>,
        masters: &HashMap<Role, CharacterAsset>,
    ) -> BTreeMap<Role, f32> {
        let mut scores = BTreeMap::new();
        for (role, subject) in subjects {
            let Some(master) = masters.get(role).filter(|a| a.tier == CharacterTier::Master) else {
                continue;
            };
            if subject.identity.embedding.is_none() {
                continue;
            }

            let score = match tokio::fs::read(&master.path).await {
                Ok(bytes) => self.extractor.similarity(&subject.identity, &bytes).await,
                Err(e) => Err(CoreError::Storage(format!("Read {}: {e}", master.path.display()))),
            };
            match score {
                Ok(Some(score)) if score < self.min_identity_similarity => {
                    tracing::warn!(
                        order_id = %order_id,
                        role = %role,
                        score,
                        threshold = self.min_identity_similarity,
                        "Master likeness below threshold",
                    );
                    scores.insert(role.clone(), score);
                }
                Ok(Some(score)) => {
                    tracing::info!(order_id = %order_id, role = %role, score, "Master likeness verified");
                    scores.insert(role.clone(), score);
                }
                Ok(None) => {
                    tracing::debug!(order_id = %order_id, role = %role, "No face to compare in master");
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, role = %role, error = %e, "Likeness check failed");
                }
            }
        }
        scores
    }

    async fn generate_page_variants(
        &self,
        workspace: &OrderWorkspace,
        book: &BookTemplate,
        pending: &[&PageTemplate],
        subjects: &BTreeMap<Role, Subject>,
        masters: &HashMap<Role, CharacterAsset>,
    ) -> HashMap<(u32, Role), CharacterAsset> {
        let mut variants = HashMap::new();
        for page in pending {
            for role in page.roles() {
                let (Some(subject), Some(master)) = (subjects.get(&role), masters.get(&role)) else {
                    continue;
                };
                let reference = page.reference_path(&role);
                if !exists(&reference).await {
                    tracing::debug!(page_id = %page.page_id, role = %role, "No page reference, skipping variant");
                    continue;
                }
                if let Some(asset) = self
                    .orchestrator
                    .generate_page(workspace, &subject.identity, master, &reference, &page.page_id, &book.prompts)
                    .await
                {
                    variants.insert((page.page_number, role), asset);
                }
            }
        }
        variants
    }

    // ---- COMPOSITING ----

    async fn composite_page(
        &self,
        workspace: &OrderWorkspace,
        page: &PageTemplate,
        subjects: &BTreeMap<Role, Subject>,
        masters: &HashMap<Role, CharacterAsset>,
        variants: &HashMap<(u32, Role), CharacterAsset>,
    ) -> Result<PageReport, CoreError> {
        let background = load_background(page).await?;

        let mut characters: HashMap<Role, RgbaImage> = HashMap::new();
        let mut tiers = BTreeMap::new();
        for role in page.roles() {
            let Some(subject) = subjects.get(&role) else {
                continue;
            };
            let master = masters
                .get(&role)
                .filter(|asset| asset.tier == CharacterTier::Master);
            let chain = FallbackChain::new(role.clone())
                .offer(
                    CharacterTier::PageVariant,
                    variants.get(&(page.page_number, role.clone())).map(|a| a.path.clone()),
                )
                .offer(CharacterTier::Master, master.map(|a| a.path.clone()))
                .offer(CharacterTier::RawPhoto, Some(subject.photo_path.clone()));
            let Some(asset) = chain.resolve() else {
                continue;
            };

            characters.insert(role.clone(), load_character(&asset.path).await?);
            tiers.insert(role, asset.tier);
        }

        let slots = page.slots.clone();
        let png = tokio::task::spawn_blocking(move || {
            let flattened = composite(&background, &slots, &characters)?;
            encode_png(&DynamicImage::ImageRgba8(flattened))
        })
        .await
        .map_err(|e| CoreError::Internal(format!("Compositing task failed: {e}")))??;

        let output = workspace.page_output_path(&page.page_id);
        write_file(&output, &png).await?;

        let remote_path = format!("orders/{}/pages/{}.png", workspace.order_id(), page.page_id);
        let image_url = self.publish(&output, &remote_path).await;

        let record = PageRecord {
            page_number: page.page_number,
            page_id: page.page_id.clone(),
            image_url: image_url.clone(),
            local_path: Some(output.to_string_lossy().into_owned()),
            tiers: tiers.clone(),
        };
        self.store.record_page(workspace.order_id(), &record).await?;

        tracing::info!(
            order_id = %workspace.order_id(),
            page_id = %page.page_id,
            url = %image_url,
            "Page composited",
        );

        Ok(PageReport {
            page_number: page.page_number,
            page_id: page.page_id.clone(),
            image_url,
            tiers,
        })
    }

    /// Publish a finished page. Upload failures fall through to the next
    /// store and finally to the local file URL.
    async fn publish(&self, local_path: &Path, remote_path: &str) -> String {
        for store in &self.publishers {
            match store.upload(local_path, remote_path).await {
                Ok(Some(url)) => return url,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(remote_path, error = %e, "Page upload failed, trying next store");
                }
            }
        }
        Url::from_file_path(local_path)
            .map(String::from)
            .unwrap_or_else(|_| local_path.display().to_string())
    }
}

/// Decode a character image, deriving alpha for opaque uploads.
async fn load_character(path: &Path) -> Result<RgbaImage, CoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::Composition(format!("Read {}: {e}", path.display())))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| CoreError::Composition(format!("Decode {}: {e}", path.display())))?;
    Ok(ensure_alpha(&image))
}
