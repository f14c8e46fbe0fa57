// Orchestrator behavior when the LLM is unreachable: the deterministic
// fallback plan, failure reporting, and cancellation.

use serenade_core::config::Settings;
use serenade_core::director::{
    DirectorPipeline, DirectorRole, PipelineConfig, PipelineHooks, PipelineInput, Section,
    StageState, StyleToken,
};
use serenade_core::stage::{CameraView, LightPreset};
use std::sync::{Arc, Mutex};

fn dead_end_config() -> PipelineConfig {
    // Nothing listens on port 9; every attempt fails fast with a network
    // error, which is retryable, so the retry path is exercised too.
    let llm = Settings {
        llm_base_url: "http://127.0.0.1:9".to_string(),
        request_timeout_ms: 2_000,
        request_retries: 2,
        retry_base_ms: 10,
        stream_responses: false,
        ..Settings::default()
    };
    PipelineConfig {
        llm,
        ..Default::default()
    }
}

fn input(n: usize) -> PipelineInput {
    PipelineInput {
        sections: (0..n)
            .map(|i| Section::new(i as u64 * 5000, (i as u64 + 1) * 5000, &format!("line {}", i)))
            .collect(),
        duration_ms: n as u64 * 5000,
        style: StyleToken::Cinematic,
        seed: "test-seed".to_string(),
        default_light: LightPreset::Spotlight,
        default_camera: CameraView::Full,
    }
}

#[tokio::test]
async fn unreachable_server_falls_back_deterministically() {
    let pipeline = DirectorPipeline::new(dead_end_config());
    let outcome = pipeline.run(&input(4), &PipelineHooks::default()).await;

    assert!(outcome.used_fallback);
    assert_eq!(outcome.performance.status, StageState::Failed);
    assert!(outcome.stage.is_none());
    assert!(outcome.camera.is_none());

    let plan = &outcome.plan;
    assert_eq!(plan.sections.len(), 4);
    // Closed vocabularies rotate by section index.
    for (i, section) in plan.sections.iter().enumerate() {
        assert!(section.mood.is_some());
        assert!(section.camera.is_some());
        assert!(section.light.is_some());
        assert_eq!(section.start_ms, i as u64 * 5000);
    }
    assert_ne!(plan.sections[0].light, plan.sections[1].light);
    assert_ne!(plan.sections[0].mood, plan.sections[1].mood);
}

#[tokio::test]
async fn fallback_is_reproducible_run_to_run() {
    let a = DirectorPipeline::new(dead_end_config())
        .run(&input(5), &PipelineHooks::default())
        .await;
    let b = DirectorPipeline::new(dead_end_config())
        .run(&input(5), &PipelineHooks::default())
        .await;
    assert_eq!(a.plan, b.plan);
}

#[tokio::test]
async fn failure_surfaces_through_the_progress_hook() {
    let seen: Arc<Mutex<Vec<(DirectorRole, StageState)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hooks = PipelineHooks {
        on_progress: Some(Arc::new(move |p| {
            sink.lock().unwrap().push((p.stage, p.status));
        })),
        ..Default::default()
    };

    let pipeline = DirectorPipeline::new(dead_end_config());
    let _ = pipeline.run(&input(2), &hooks).await;

    let records = seen.lock().unwrap();
    assert!(records
        .iter()
        .any(|(role, status)| *role == DirectorRole::Performance
            && *status == StageState::Running));
    assert!(records
        .iter()
        .any(|(role, status)| *role == DirectorRole::Performance
            && *status == StageState::Failed));
}

#[tokio::test]
async fn cancel_before_run_reports_cancelled() {
    let pipeline = DirectorPipeline::new(dead_end_config());
    pipeline.cancel();
    let outcome = pipeline.run(&input(3), &PipelineHooks::default()).await;

    assert!(outcome.used_fallback);
    assert_eq!(outcome.performance.status, StageState::Cancelled);
    // The show still has a usable plan.
    assert_eq!(outcome.plan.sections.len(), 3);
}
