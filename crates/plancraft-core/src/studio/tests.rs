use super::*;
use crate::notify::NoticeKind;
use crate::pipeline::StyleKey;
use crate::remote::testing::ScriptedServices;
use crate::remote::{ParseOutcome, TaskStatus};
use crate::session::{WhiteboxAsset, WorkflowStep};
use crate::views::CameraView;
use std::collections::BTreeMap;
use std::time::Duration;

fn test_config() -> Config {
    let temp_dir = std::env::temp_dir();
    Config {
        settings_file: temp_dir.join("plancraft-test-settings.json"),
        ..Config::default()
    }
}

fn whitebox(model: &str, depth: &str) -> WhiteboxAsset {
    let mut depths = BTreeMap::new();
    depths.insert("main".to_string(), depth.to_string());
    WhiteboxAsset::new(model, depths)
}

fn task(task_id: &str) -> StudioResult<ParseOutcome> {
    Ok(ParseOutcome::Task {
        task_id: task_id.to_string(),
    })
}

fn create_studio(services: ScriptedServices) -> (Studio, Arc<ScriptedServices>) {
    create_studio_with(test_config(), services)
}

fn create_studio_with(config: Config, services: ScriptedServices) -> (Studio, Arc<ScriptedServices>) {
    let services = Arc::new(services);
    let (studio, _changes) = Studio::new(config, services.clone());
    (studio, services)
}

fn plan() -> SourceFile {
    SourceFile::new("plan.dxf", "0\nSECTION")
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cad_upload_to_gallery() {
    let (studio, services) = create_studio(
        ScriptedServices::default()
            .with_parse(task("t1"))
            .with_polls(
                "t1",
                vec![
                    Ok(TaskStatus::Pending { progress: Some(40) }),
                    Ok(TaskStatus::Success {
                        result: Some(whitebox("m1", "d1")),
                    }),
                ],
            )
            .with_render(Ok(vec!["http://x/render-main.png".to_string()])),
    );

    studio.upload(plan()).await.unwrap();
    assert_eq!(studio.stage().await, Stage::ProcessingAsync);
    assert_eq!(studio.polling_task().as_deref(), Some("t1"));

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::ProcessingAsync);
    assert_eq!(
        session.progress_note.as_deref(),
        Some("Generating 3D whitebox... 40%")
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::WhiteboxReady);
    assert_eq!(session.assets.whitebox().unwrap().model_ref, "m1");
    assert!(session.active_task.is_none());
    assert_eq!(session.step(), WorkflowStep::Generate);
    assert!(!studio.is_polling());

    let batch = studio
        .render(
            &ViewSelection::new([CameraView::Main]),
            &StyleParams::new(StyleKey::Modern, "", 0.5),
        )
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].view, CameraView::Main);

    assert_eq!(studio.stage().await, Stage::GalleryReady);
    assert_eq!(studio.current_label().await, Some("Main view"));

    let download = studio.download_current().await.unwrap();
    assert_eq!(download.file_name, "render-1.png");
    assert_eq!(download.image_ref, "http://x/render-main.png");

    let request = &services.render_requests()[0];
    assert_eq!(request.depth_ref, "d1");
    assert_eq!(request.prompt, "modern minimalist, interior design");
}

#[tokio::test(start_paused = true)]
async fn test_task_failure_allows_retry_without_upload() {
    let (studio, services) = create_studio(
        ScriptedServices::default()
            .with_parse(task("t1"))
            .with_polls("t1", vec![Ok(TaskStatus::Failure { reason: None })])
            .with_parse(Ok(ParseOutcome::Completed(whitebox("m2", "d2")))),
    );

    let first = studio.upload(plan()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let session = studio.snapshot().await;
    assert_ne!(session.stage, Stage::ProcessingAsync);
    assert!(session.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert!(session.active_task.is_none());
    assert!(session.assets.upload().is_some());
    assert!(session.can_retry());
    assert!(!studio.is_polling());

    let retried = studio.retry_processing().await.unwrap();
    assert!(retried > first);

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::WhiteboxReady);
    assert_eq!(session.assets.whitebox().unwrap().model_ref, "m2");
    assert!(session.error.is_none());
    assert_eq!(services.calls_matching("begin_structural_parse:plan.dxf"), 2);
}

#[tokio::test]
async fn test_raster_upload_then_whitebox() {
    let (studio, services) = create_studio(
        ScriptedServices::default()
            .with_store(Ok(crate::session::StoredAsset {
                storage_ref: "http://x/floor.png".to_string(),
                display_name: "floor.png".to_string(),
                encrypted: true,
            }))
            .with_whitebox(Ok(whitebox("wb", "depth"))),
    );

    studio
        .upload(SourceFile::new("floor.png", vec![0x89, 0x50]))
        .await
        .unwrap();
    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::AwaitingSyncResult);
    assert_eq!(session.step(), WorkflowStep::Configure);
    assert!(!studio.is_polling());

    studio.retry_processing().await.unwrap();
    assert_eq!(studio.stage().await, Stage::WhiteboxReady);
    assert_eq!(
        services.calls(),
        vec!["store_asset:floor.png", "generate_whitebox:http://x/floor.png"]
    );
}

// ============================================================================
// Generation fencing and single poller
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_superseded_upload_result_is_discarded() {
    let services = Arc::new(
        ScriptedServices::default()
            .with_latency(Duration::from_secs(1))
            .with_parse(Ok(ParseOutcome::Completed(whitebox("stale", "d-stale"))))
            .with_parse(task("t2")),
    );
    let (studio, _changes) = Studio::new(test_config(), services.clone());
    let studio = Arc::new(studio);

    let first = {
        let studio = studio.clone();
        tokio::spawn(async move { studio.upload(SourceFile::new("a.dxf", "a")).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = studio.upload(SourceFile::new("b.dxf", "b")).await.unwrap();
    first.await.unwrap().unwrap();

    let session = studio.snapshot().await;
    assert_eq!(session.generation, second);
    assert!(session.assets.whitebox().is_none());
    assert_eq!(session.assets.upload().unwrap().file.name, "b.dxf");
    assert_eq!(session.stage, Stage::ProcessingAsync);
    assert_eq!(session.active_task.unwrap().task_id, "t2");
}

#[tokio::test(start_paused = true)]
async fn test_new_upload_stops_previous_poller() {
    let (studio, services) = create_studio(
        ScriptedServices::default()
            .with_parse(task("t1"))
            .with_parse(task("t2"))
            .with_polls(
                "t1",
                vec![Ok(TaskStatus::Success {
                    result: Some(whitebox("m1", "d1")),
                })],
            ),
    );

    studio.upload(SourceFile::new("a.dxf", "a")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    studio.upload(SourceFile::new("b.dxf", "b")).await.unwrap();
    assert_eq!(studio.polling_task().as_deref(), Some("t2"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(services.calls_matching("poll_task:t1"), 0);
    assert_eq!(services.calls_matching("poll_task:t2"), 2);

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::ProcessingAsync);
    assert!(session.assets.whitebox().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_stops_polling() {
    let (studio, services) = create_studio(ScriptedServices::default().with_parse(task("t1")));

    studio.upload(plan()).await.unwrap();
    assert!(studio.is_polling());

    studio.reset().await;
    assert!(!studio.is_polling());
    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::Idle);
    assert_eq!(session.step(), WorkflowStep::Import);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(services.calls_matching("poll_task:t1"), 0);
}

// ============================================================================
// Rendering and gallery
// ============================================================================

async fn studio_with_gallery(
    config: Config,
    services: ScriptedServices,
    images: &[&str],
) -> (Studio, Arc<ScriptedServices>) {
    let services = services
        .with_parse(Ok(ParseOutcome::Completed(whitebox("m1", "d1"))))
        .with_render(Ok(images.iter().map(|s| s.to_string()).collect()));
    let (studio, services) = create_studio_with(config, services);
    studio.upload(plan()).await.unwrap();
    studio
        .render(
            &ViewSelection::new([CameraView::Main, CameraView::Side, CameraView::TopA]),
            &StyleParams::default(),
        )
        .await
        .unwrap();
    (studio, services)
}

#[tokio::test]
async fn test_empty_selection_issues_no_render_call() {
    let (studio, services) = create_studio(
        ScriptedServices::default().with_parse(Ok(ParseOutcome::Completed(whitebox("m1", "d1")))),
    );
    studio.upload(plan()).await.unwrap();

    let err = studio
        .render(&ViewSelection::default(), &StyleParams::new(StyleKey::Wabi, "", 0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::InvalidRequest { .. }));
    assert_eq!(services.calls_matching("render_batch"), 0);

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::WhiteboxReady);
    assert!(session.error.is_some());
}

#[tokio::test]
async fn test_gallery_navigation_clamps() {
    let (studio, _services) =
        studio_with_gallery(test_config(), ScriptedServices::default(), &["i0", "i1", "i2"]).await;

    for _ in 0..8 {
        studio.next_image().await;
    }
    assert_eq!(studio.snapshot().await.gallery.index(), 2);
    assert_eq!(studio.current_label().await, Some("Elevation A"));
    assert_eq!(
        studio.download_current().await.unwrap().file_name,
        "render-3.png"
    );

    for _ in 0..8 {
        studio.previous_image().await;
    }
    assert_eq!(studio.snapshot().await.gallery.index(), 0);
    assert_eq!(studio.select_image(42).await, 2);
}

#[tokio::test]
async fn test_render_failure_keeps_whitebox() {
    let (studio, _services) = create_studio(
        ScriptedServices::default()
            .with_parse(Ok(ParseOutcome::Completed(whitebox("m1", "d1"))))
            .with_render(Err(StudioError::Validation {
                lines: vec!["prompt: too long".to_string()],
            })),
    );
    studio.upload(plan()).await.unwrap();

    studio
        .render(&ViewSelection::new([CameraView::Main]), &StyleParams::default())
        .await
        .unwrap_err();

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::WhiteboxReady);
    assert_eq!(session.error.as_deref(), Some("prompt: too long"));
    assert!(session.assets.render_batch().is_none());
}

// ============================================================================
// Refinement and notices
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_refine_stub_posts_notice() {
    let (studio, services) =
        studio_with_gallery(test_config(), ScriptedServices::default(), &["i0", "i1", "i2"]).await;

    studio.refine("make it brighter").await.unwrap();
    let notice = studio.notice().unwrap();
    assert_eq!(notice.kind, NoticeKind::ComingSoon);
    assert_eq!(notice.message, "Refinement is coming soon");
    assert_eq!(services.calls_matching("refine:i0"), 0);

    tokio::time::sleep(Duration::from_millis(2600)).await;
    assert!(studio.notice().is_none());
}

#[tokio::test]
async fn test_refine_rejects_empty_instruction() {
    let (studio, services) =
        studio_with_gallery(test_config(), ScriptedServices::default(), &["i0"]).await;

    let err = studio.refine("   ").await.unwrap_err();
    assert!(matches!(err, StudioError::InvalidRequest { .. }));
    assert!(studio.notice().is_none());
    assert_eq!(services.calls_matching("refine:i0"), 0);
}

#[tokio::test]
async fn test_enabled_refine_replaces_current_item() {
    let config = Config {
        refinement_enabled: true,
        ..test_config()
    };
    let (studio, _services) = studio_with_gallery(
        config,
        ScriptedServices::default().with_refine(Ok("i1-warm".to_string())),
        &["i0", "i1", "i2"],
    )
    .await;

    studio.select_image(1).await;
    studio.refine("warmer light").await.unwrap();

    let session = studio.snapshot().await;
    let batch = session.assets.render_batch().unwrap();
    let refs: Vec<&str> = batch.iter().map(|i| i.image_ref.as_str()).collect();
    assert_eq!(refs, vec!["i0", "i1-warm", "i2"]);
    assert_eq!(session.gallery.index(), 1);
    assert_eq!(session.current_label(), Some("Side view"));
}

async fn studio_with_refinement(services: ScriptedServices) -> (Arc<Studio>, Arc<ScriptedServices>) {
    let config = Config {
        refinement_enabled: true,
        ..test_config()
    };
    let (studio, services) = create_studio_with(
        config,
        services.with_parse(Ok(ParseOutcome::Completed(whitebox("m1", "d1")))),
    );
    studio.upload(plan()).await.unwrap();
    (Arc::new(studio), services)
}

fn gallery_refs(session: &PipelineSession) -> Vec<String> {
    session
        .assets
        .render_batch()
        .into_iter()
        .flatten()
        .map(|item| item.image_ref.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_refine_result_never_lands_in_newer_batch() {
    let (studio, services) = studio_with_refinement(
        ScriptedServices::default()
            .with_call_latency("refine", Duration::from_secs(3))
            .with_render(Ok(vec!["old0".to_string(), "old1".to_string()]))
            .with_render(Ok(vec!["new0".to_string(), "new1".to_string()]))
            .with_refine(Ok("old0-refined".to_string())),
    )
    .await;
    let views = ViewSelection::new([CameraView::Main, CameraView::Side]);
    studio.render(&views, &StyleParams::default()).await.unwrap();

    let refining = {
        let studio = studio.clone();
        tokio::spawn(async move { studio.refine("warmer light").await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    studio.render(&views, &StyleParams::default()).await.unwrap();

    let err = refining.await.unwrap().unwrap_err();
    assert!(matches!(err, StudioError::Superseded { .. }));
    assert_eq!(services.calls_matching("refine:old0"), 1);

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::GalleryReady);
    assert_eq!(gallery_refs(&session), vec!["new0", "new1"]);
}

#[tokio::test(start_paused = true)]
async fn test_refine_failure_does_not_cancel_pending_render() {
    let (studio, _services) = studio_with_refinement(
        ScriptedServices::default()
            .with_latency(Duration::from_secs(1))
            .with_render(Ok(vec!["old0".to_string()]))
            .with_render(Ok(vec!["new0".to_string()]))
            .with_refine(Err(StudioError::transport("refine down"))),
    )
    .await;
    let views = ViewSelection::new([CameraView::Main]);
    studio.render(&views, &StyleParams::default()).await.unwrap();

    let refining = {
        let studio = studio.clone();
        tokio::spawn(async move { studio.refine("warmer light").await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    let batch = studio.render(&views, &StyleParams::default()).await.unwrap();
    assert_eq!(batch[0].image_ref, "new0");

    let err = refining.await.unwrap().unwrap_err();
    assert_eq!(err.display_message(), "refine down");

    let session = studio.snapshot().await;
    assert_eq!(session.stage, Stage::GalleryReady);
    assert_eq!(gallery_refs(&session), vec!["new0"]);
    assert!(session.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_poller_and_notices() {
    let (studio, services) = create_studio(ScriptedServices::default().with_parse(task("t1")));
    studio.upload(plan()).await.unwrap();
    studio.coming_soon("Landscape design");

    studio.shutdown();
    assert!(!studio.is_polling());
    assert!(studio.notice().is_none());

    studio.coming_soon("Lighting presets");
    assert!(studio.notice().is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(services.calls_matching("poll_task:t1"), 0);
}

#[tokio::test]
async fn test_changes_feed_reports_stages() {
    let services = Arc::new(
        ScriptedServices::default().with_parse(Ok(ParseOutcome::Completed(whitebox("m1", "d1")))),
    );
    let (studio, mut changes) = Studio::new(test_config(), services);

    studio.upload(plan()).await.unwrap();

    let mut stages = Vec::new();
    while let Ok(summary) = changes.try_recv() {
        stages.push(summary.stage);
    }
    assert_eq!(stages, vec![Stage::Uploading, Stage::WhiteboxReady]);
}
