mod common;

use common::*;
use pickabook_core::error::CoreError;
use pickabook_core::fallback::CharacterTier;
use pickabook_core::order::OrderState;
use pickabook_core::quality::PhotoQuality;
use pickabook_pipeline::workspace::OrderWorkspace;

fn three_page_book(fixture: &Fixture) -> pickabook_core::template::TemplateRef {
    fixture.write_book(&[
        PageFixture::with_reference(1),
        PageFixture::with_reference(2),
        PageFixture::without_reference(3),
    ])
}

/// Every run in `history` starts from `queued` and only takes allowed steps.
fn assert_walks_state_machine(history: &[OrderState]) {
    let mut current = OrderState::Queued;
    for &next in history {
        assert!(current.can_transition_to(next), "{current} -> {next} in {history:?}");
        current = if next.is_terminal() { OrderState::Queued } else { next };
    }
    assert!(current == OrderState::Queued, "run left unfinished: {history:?}");
}

#[tokio::test]
async fn completes_order_and_records_every_page() {
    let fixture = Fixture::new();
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert!(report.failure_reason.is_none());
    assert!(report.skipped_pages.is_empty());
    assert_eq!(
        fixture.store.state_history(job.order_id),
        vec![
            OrderState::Validating,
            OrderState::Generating,
            OrderState::Compositing,
            OrderState::Completed,
        ]
    );
    assert_walks_state_machine(&fixture.store.state_history(job.order_id));

    let tiers: Vec<CharacterTier> = report
        .pages
        .iter()
        .map(|p| p.tiers[&role("child")])
        .collect();
    assert_eq!(
        tiers,
        vec![CharacterTier::PageVariant, CharacterTier::PageVariant, CharacterTier::Master]
    );
    assert_eq!(fixture.generator.master_calls(), 1);
    assert_eq!(fixture.generator.page_calls(), 2);

    let recorded = fixture.store.pages(job.order_id);
    assert_eq!(recorded.len(), 3);
    assert_eq!(
        recorded[0].image_url,
        format!("https://cdn.test/orders/{}/pages/p001.png", job.order_id)
    );

    let workspace = OrderWorkspace::new(&fixture.orders_root(), job.order_id);
    for page_id in ["p001", "p002", "p003"] {
        let output = image::open(workspace.page_output_path(page_id)).unwrap();
        assert_eq!((output.width(), output.height()), (300, 200));
    }
    assert!(workspace.identity_record_path(&role("child")).exists());
    assert!(workspace.face_crop_path(&role("child")).exists());
}

#[tokio::test]
async fn second_run_does_no_work() {
    let fixture = Fixture::new();
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);
    let controller = fixture.controller();

    controller.run(&job).await.unwrap();
    let calls = fixture.generator.calls();
    let detections = fixture.detector.calls();
    let uploads = fixture.blobs.uploads().len();

    let report = controller.run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert!(report.pages.is_empty());
    assert_eq!(report.skipped_pages, vec![1, 2, 3]);
    assert_eq!(fixture.generator.calls(), calls);
    assert_eq!(fixture.detector.calls(), detections);
    assert_eq!(fixture.blobs.uploads().len(), uploads);
    assert_walks_state_machine(&fixture.store.state_history(job.order_id));
}

#[tokio::test]
async fn master_failure_falls_back_to_raw_photo() {
    let fixture = Fixture::new();
    fixture.generator.fail_masters(true);
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    let tiers: Vec<CharacterTier> = report.pages.iter().map(|p| p.tiers[&role("child")]).collect();
    assert_eq!(
        tiers,
        vec![CharacterTier::PageVariant, CharacterTier::PageVariant, CharacterTier::RawPhoto]
    );
}

#[tokio::test]
async fn failed_page_variant_falls_back_to_master() {
    let fixture = Fixture::new();
    let template = fixture.write_book(&[
        PageFixture::with_reference(1),
        PageFixture::with_reference(2),
        PageFixture::with_reference(3),
    ]);
    fixture
        .generator
        .fail_reference(fixture.page_reference(&template, 3));
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    let tiers: Vec<CharacterTier> = report.pages.iter().map(|p| p.tiers[&role("child")]).collect();
    assert_eq!(
        tiers,
        vec![CharacterTier::PageVariant, CharacterTier::PageVariant, CharacterTier::Master]
    );
    assert_eq!(fixture.generator.master_calls(), 1);
    assert_eq!(fixture.generator.page_calls(), 3);

    let workspace = OrderWorkspace::new(&fixture.orders_root(), job.order_id);
    assert!(!workspace.page_variant_path("p003", &role("child")).exists());
}

#[tokio::test]
async fn every_generation_failing_still_completes_with_photos() {
    let fixture = Fixture::new();
    fixture.generator.fail_masters(true);
    fixture.generator.fail_pages(true);
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert_eq!(report.pages.len(), 3);
    assert!(report
        .pages
        .iter()
        .all(|p| p.tiers[&role("child")] == CharacterTier::RawPhoto));
}

#[tokio::test]
async fn undecodable_photo_fails_validation() {
    let fixture = Fixture::new();
    let template = three_page_book(&fixture);
    let job = fixture.job(
        template,
        vec![(role("child"), fixture.write_raw("kid.png", b"definitely not a png"))],
    );

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Failed);
    let reason = report.failure_reason.unwrap();
    assert!(reason.contains("not a decodable image"), "{reason}");
    assert_eq!(fixture.generator.calls(), 0);
    assert_eq!(
        fixture.store.state_history(job.order_id),
        vec![OrderState::Validating, OrderState::Failed]
    );
    assert_eq!(fixture.store.failure_reason(job.order_id), Some(reason));
}

#[tokio::test]
async fn photo_without_faces_fails() {
    let fixture = Fixture::with_detector(FakeFaceDetector::with_faces(Vec::new()));
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Failed);
    assert_eq!(
        report.failure_reason.as_deref(),
        Some(CoreError::NoFaceDetected.to_string().as_str())
    );
    assert!(fixture.store.pages(job.order_id).is_empty());
}

#[tokio::test]
async fn low_quality_photo_fails_validation() {
    let fixture = Fixture::new();
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture
        .controller()
        .with_photo_quality(PhotoQuality::default())
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.state, OrderState::Failed);
    let reason = report.failure_reason.unwrap();
    assert!(reason.contains("Low resolution (200px < 500px)"), "{reason}");
    assert!(reason.contains("Image is too blurry"), "{reason}");
    assert_eq!(fixture.detector.calls(), 0);
    assert_eq!(fixture.generator.calls(), 0);
}

#[tokio::test]
async fn sharp_photo_passes_quality_gate() {
    let fixture = Fixture::new();
    let template = fixture.write_book(&[PageFixture::without_reference(1)]);
    let job = fixture.job(
        template,
        vec![(role("child"), fixture.write_sharp_photo("kid.png", 600))],
    );

    let report = fixture
        .controller()
        .with_photo_quality(PhotoQuality::default())
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.state, OrderState::Completed);
}

#[tokio::test]
async fn master_likeness_is_scored() {
    let fixture = Fixture::with_detector(FakeFaceDetector::with_faces(vec![face_with_embedding(
        vec![0.6, 0.8],
    )]));
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture
        .controller()
        .with_min_identity_similarity(0.5)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.state, OrderState::Completed);
    let score = report.identity_scores[&role("child")];
    assert!((score - 1.0).abs() < 1e-6, "{score}");
    // Once for the photo, once for the generated master.
    assert_eq!(fixture.detector.calls(), 2);
}

#[tokio::test]
async fn failed_master_is_not_scored() {
    let fixture = Fixture::with_detector(FakeFaceDetector::with_faces(vec![face_with_embedding(
        vec![0.6, 0.8],
    )]));
    fixture.generator.fail_masters(true);
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert!(report.identity_scores.is_empty());
    assert_eq!(fixture.detector.calls(), 1);
}

#[tokio::test]
async fn duplicate_roles_fail_validation() {
    let fixture = Fixture::new();
    let template = three_page_book(&fixture);
    let job = fixture.job(
        template,
        vec![
            (role("child"), fixture.write_photo("a.png")),
            (role("child"), fixture.write_photo("b.png")),
        ],
    );

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Failed);
    assert!(report.failure_reason.unwrap().contains("More than one photo"));
}

#[tokio::test]
async fn missing_background_fails_and_resume_keeps_earlier_pages() {
    let fixture = Fixture::new();
    let template = fixture.write_book(&[
        PageFixture::with_reference(1),
        PageFixture {
            number: 2,
            has_reference: true,
            has_background: false,
        },
        PageFixture::without_reference(3),
    ]);
    let job = fixture.job(template.clone(), vec![(role("child"), fixture.write_photo("kid.png"))]);
    let controller = fixture.controller();

    let failed = controller.run(&job).await.unwrap();

    assert_eq!(failed.state, OrderState::Failed);
    assert!(failed.failure_reason.unwrap().starts_with("Template asset missing"));
    assert_eq!(failed.pages.len(), 1);
    let recorded: Vec<u32> = fixture
        .store
        .pages(job.order_id)
        .iter()
        .map(|p| p.page_number)
        .collect();
    assert_eq!(recorded, vec![1]);

    fixture.write_background(&template, 2);
    let resumed = controller.run(&job).await.unwrap();

    assert_eq!(resumed.state, OrderState::Completed);
    assert_eq!(resumed.skipped_pages, vec![1]);
    let composited: Vec<u32> = resumed.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(composited, vec![2, 3]);
    assert_eq!(fixture.store.pages(job.order_id).len(), 3);
    assert_walks_state_machine(&fixture.store.state_history(job.order_id));
}

#[tokio::test]
async fn rate_limited_master_is_retried() {
    let fixture = Fixture::new();
    fixture.generator.rate_limit_next(2);
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert_eq!(fixture.generator.master_calls(), 3);
    assert_eq!(report.pages[2].tiers[&role("child")], CharacterTier::Master);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let fixture = Fixture::new();
    fixture.generator.rate_limit_next(3);
    let template = three_page_book(&fixture);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert_eq!(fixture.generator.master_calls(), 3);
    assert_eq!(fixture.generator.page_calls(), 2);
    assert_eq!(report.pages[2].tiers[&role("child")], CharacterTier::RawPhoto);
}

#[tokio::test]
async fn failed_upload_falls_back_to_local_url() {
    let fixture = Fixture::new().with_blobs(BlobBehavior::Fail);
    let template = fixture.write_book(&[PageFixture::without_reference(1)]);
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Completed);
    assert_eq!(fixture.blobs.uploads().len(), 1);
    assert!(report.pages[0].image_url.starts_with("file://"));
    assert!(report.pages[0].image_url.ends_with("page_p001.png"));
}

#[tokio::test]
async fn unknown_template_fails_order() {
    let fixture = Fixture::new();
    let template = pickabook_core::template::TemplateRef::new("missing", "v9").unwrap();
    let job = fixture.job(template, vec![(role("child"), fixture.write_photo("kid.png"))]);

    let report = fixture.controller().run(&job).await.unwrap();

    assert_eq!(report.state, OrderState::Failed);
    assert_eq!(fixture.detector.calls(), 0);
    assert_eq!(fixture.store.state_history(job.order_id), vec![OrderState::Failed]);
}
