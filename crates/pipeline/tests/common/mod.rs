//! Shared fakes and on-disk fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use pickabook_core::background::encode_png;
use pickabook_core::capabilities::{
    BackgroundRemover, BlobStore, FaceDetector, GenerationProvider, GenerationRequest, ProviderError,
};
use pickabook_core::identity::{BoundingBox, DetectedFace};
use pickabook_core::retry::RetryPolicy;
use pickabook_core::template::TemplateRef;
use pickabook_core::types::Role;
use pickabook_pipeline::assets::TemplateLibrary;
use pickabook_pipeline::identity::IdentityExtractor;
use pickabook_pipeline::orchestrator::GenerationOrchestrator;
use pickabook_pipeline::postprocess::PostProcessor;
use pickabook_pipeline::source::SourceReader;
use pickabook_pipeline::{InMemoryProgressStore, OrderJob, PhotoInput, PipelineController};
use reqwest::Url;
use tempfile::TempDir;

pub const MASTER_PROMPT: &str = "MASTER {role}";
pub const PAGE_PROMPT: &str = "PAGE {role}";

pub fn role(tag: &str) -> Role {
    Role::new(tag).unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
        call_timeout: Duration::from_secs(5),
    }
}

fn png(image: DynamicImage) -> Vec<u8> {
    encode_png(&image).unwrap()
}

fn write(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Writes a solid character image per call and returns its `file://` URL.
///
/// Master and page calls are told apart by the test prompts.
pub struct FakeGenerator {
    out_dir: PathBuf,
    calls: AtomicU32,
    master_calls: AtomicU32,
    page_calls: AtomicU32,
    rate_limited_calls: AtomicU32,
    fail_masters: AtomicBool,
    fail_pages: AtomicBool,
    failing_references: Mutex<Vec<Vec<u8>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            calls: AtomicU32::new(0),
            master_calls: AtomicU32::new(0),
            page_calls: AtomicU32::new(0),
            rate_limited_calls: AtomicU32::new(0),
            fail_masters: AtomicBool::new(false),
            fail_pages: AtomicBool::new(false),
            failing_references: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next `n` calls with a rate-limit error.
    pub fn rate_limit_next(&self, n: u32) {
        self.rate_limited_calls.store(n, Ordering::SeqCst);
    }

    pub fn fail_masters(&self, fail: bool) {
        self.fail_masters.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pages(&self, fail: bool) {
        self.fail_pages.store(fail, Ordering::SeqCst);
    }

    /// Fail every call whose reference image is exactly `reference`.
    pub fn fail_reference(&self, reference: Vec<u8>) {
        self.failing_references.lock().unwrap().push(reference);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn master_calls(&self) -> u32 {
        self.master_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let is_master = request.prompt.starts_with("MASTER");
        if is_master {
            self.master_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
        }

        let limited = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if limited {
            return Err(ProviderError::RateLimited("throttled".into()));
        }

        let failing = if is_master { &self.fail_masters } else { &self.fail_pages };
        let failing_reference = self
            .failing_references
            .lock()
            .unwrap()
            .contains(&request.reference_image);
        if failing.load(Ordering::SeqCst) || failing_reference {
            return Err(ProviderError::Api {
                status: 500,
                body: "model crashed".into(),
            });
        }

        let path = self.out_dir.join(format!("gen_{n}.png"));
        let character = RgbaImage::from_pixel(80, 120, Rgba([30, 90, 200, 255]));
        write(&path, &png(DynamicImage::ImageRgba8(character)));
        Ok(Url::from_file_path(&path).unwrap().to_string())
    }
}

// ---------------------------------------------------------------------------
// Face analysis / background removal
// ---------------------------------------------------------------------------

pub struct FakeFaceDetector {
    faces: Vec<DetectedFace>,
    calls: AtomicU32,
    failing_references: Mutex<Vec<Vec<u8>>>,
}

impl FakeFaceDetector {
    pub fn with_faces(faces: Vec<DetectedFace>) -> Self {
        Self {
            faces,
            calls: AtomicU32::new(0),
            failing_references: Mutex::new(Vec::new()),
        }
    }

    /// One face centered in a [`PHOTO_SIZE`] photo.
    pub fn single_face() -> Self {
        Self::with_faces(vec![face(60.0, 60.0, 140.0, 140.0)])
    }

    /// Fail every call whose reference image is exactly `reference`.
    pub fn fail_reference(&self, reference: Vec<u8>) {
        self.failing_references.lock().unwrap().push(reference);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectedFace {
    DetectedFace {
        bbox: BoundingBox::new(x1, y1, x2, y2),
        score: 0.99,
        embedding: None,
        gender: None,
        age: Some(6.0),
    }
}

pub fn face_with_embedding(embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        embedding: Some(embedding),
        ..face(60.0, 60.0, 140.0, 140.0)
    }
}

#[async_trait]
impl FaceDetector for FakeFaceDetector {
    async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.faces.clone())
    }
}

pub struct PassthroughRemover;

#[async_trait]
impl BackgroundRemover for PassthroughRemover {
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError> {
        Ok(image.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

pub enum BlobBehavior {
    Accept,
    Decline,
    Fail,
}

pub struct RecordingBlobStore {
    behavior: BlobBehavior,
    uploads: Mutex<Vec<String>>,
}

impl RecordingBlobStore {
    pub fn new(behavior: BlobBehavior) -> Self {
        Self {
            behavior,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<Option<String>, ProviderError> {
        assert!(local_path.exists(), "upload of missing file {}", local_path.display());
        self.uploads.lock().unwrap().push(remote_path.to_string());
        match self.behavior {
            BlobBehavior::Accept => Ok(Some(format!("https://cdn.test/{remote_path}"))),
            BlobBehavior::Decline => Ok(None),
            BlobBehavior::Fail => Err(ProviderError::Api {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub const PHOTO_SIZE: u32 = 200;

/// One page of a generated test book.
pub struct PageFixture {
    pub number: u32,
    pub has_reference: bool,
    pub has_background: bool,
}

impl PageFixture {
    pub fn with_reference(number: u32) -> Self {
        Self {
            number,
            has_reference: true,
            has_background: true,
        }
    }

    pub fn without_reference(number: u32) -> Self {
        Self {
            number,
            has_reference: false,
            has_background: true,
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub generator: Arc<FakeGenerator>,
    pub detector: Arc<FakeFaceDetector>,
    pub store: Arc<InMemoryProgressStore>,
    pub blobs: Arc<RecordingBlobStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_detector(FakeFaceDetector::single_face())
    }

    pub fn with_detector(detector: FakeFaceDetector) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator::new(dir.path().join("provider"));
        Self {
            dir,
            generator: Arc::new(generator),
            detector: Arc::new(detector),
            store: Arc::new(InMemoryProgressStore::new()),
            blobs: Arc::new(RecordingBlobStore::new(BlobBehavior::Accept)),
        }
    }

    pub fn with_blobs(mut self, behavior: BlobBehavior) -> Self {
        self.blobs = Arc::new(RecordingBlobStore::new(behavior));
        self
    }

    pub fn assets_root(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    pub fn orders_root(&self) -> PathBuf {
        self.dir.path().join("orders")
    }

    /// Write a `dragon/v1` book with a master reference for `child` and one
    /// fit-height `child` slot per page.
    pub fn write_book(&self, pages: &[PageFixture]) -> TemplateRef {
        let template = TemplateRef::new("dragon", "v1").unwrap();
        let book_dir = template.dir(&self.assets_root());

        write(
            &book_dir.join("prompts.json"),
            serde_json::json!({ "master_prompt": MASTER_PROMPT, "page_prompt": PAGE_PROMPT })
                .to_string()
                .as_bytes(),
        );
        write(&book_dir.join("ref_master_child.png"), &solid_rgb(90, 140, [120, 160, 90]));

        for page in pages {
            let dir = template.pages_dir(&self.assets_root()).join(format!("p{:03}", page.number));
            let slots = serde_json::json!({
                "canvas": { "width_px": 300, "height_px": 200 },
                "slots": [{
                    "slot_id": "hero",
                    "role": "child",
                    "bbox_px": { "x": 20, "y": 20, "w": 100, "h": 150 },
                    "z_index": 1,
                    "scale_mode": "fit_height"
                }]
            });
            write(&dir.join("slot.json"), slots.to_string().as_bytes());
            if page.has_background {
                self.write_background(&template, page.number);
            }
            if page.has_reference {
                // Distinct per page so a single page's generation can be failed.
                let shade = (page.number % 256) as u8;
                write(&dir.join("ref_child.png"), &solid_rgb(90, 140, [200, 120, shade]));
            }
        }
        template
    }

    pub fn page_reference(&self, template: &TemplateRef, page_number: u32) -> Vec<u8> {
        let path = template
            .pages_dir(&self.assets_root())
            .join(format!("p{page_number:03}"))
            .join("ref_child.png");
        std::fs::read(path).unwrap()
    }

    pub fn write_background(&self, template: &TemplateRef, page_number: u32) {
        let path = template
            .pages_dir(&self.assets_root())
            .join(format!("p{page_number:03}"))
            .join("bg.png");
        let bg = RgbaImage::from_pixel(300, 200, Rgba([250, 245, 230, 255]));
        write(&path, &png(DynamicImage::ImageRgba8(bg)));
    }

    /// Write a decodable photo and return its path as a reference string.
    pub fn write_photo(&self, name: &str) -> String {
        let path = self.dir.path().join("uploads").join(name);
        write(&path, &solid_rgb(PHOTO_SIZE, PHOTO_SIZE, [205, 160, 130]));
        path.to_string_lossy().into_owned()
    }

    /// Write a high-contrast checkerboard photo of `size` x `size` pixels.
    pub fn write_sharp_photo(&self, name: &str, size: u32) -> String {
        let board = RgbImage::from_fn(size, size, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([30, 30, 30])
            } else {
                Rgb([230, 220, 210])
            }
        });
        let path = self.dir.path().join("uploads").join(name);
        write(&path, &png(DynamicImage::ImageRgb8(board)));
        path.to_string_lossy().into_owned()
    }

    pub fn write_raw(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.dir.path().join("uploads").join(name);
        write(&path, bytes);
        path.to_string_lossy().into_owned()
    }

    pub fn job(&self, template: TemplateRef, photos: Vec<(Role, String)>) -> OrderJob {
        OrderJob {
            order_id: uuid::Uuid::now_v7(),
            template,
            photos: photos
                .into_iter()
                .map(|(role, reference)| PhotoInput {
                    role,
                    reference,
                    face_index: 0,
                })
                .collect(),
        }
    }

    pub fn orchestrator(&self) -> GenerationOrchestrator {
        let post = PostProcessor::new(Arc::new(PassthroughRemover), fast_retry());
        GenerationOrchestrator::new(
            self.generator.clone(),
            post,
            SourceReader::default(),
            fast_retry(),
        )
    }

    pub fn controller(&self) -> PipelineController {
        let publishers: Vec<Arc<dyn BlobStore>> = vec![self.blobs.clone()];
        PipelineController::new(
            TemplateLibrary::new(self.assets_root()),
            self.orders_root(),
            IdentityExtractor::new(self.detector.clone(), fast_retry()),
            self.orchestrator(),
            SourceReader::default(),
            publishers,
            self.store.clone(),
        )
    }
}

pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    png(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color))))
}
