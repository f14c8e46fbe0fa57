// SERENADE Director Pipeline - Performance then Stage and Camera
// Copyright (c) 2026 SERENADE Project
//
// Performance runs first (chunked for long songs), then Stage and Camera run
// against its plan, in parallel by default. Any director may fail without
// sinking the show: failures surface through the progress hook and the merge
// falls back field by field. When Performance itself produces nothing
// usable, a deterministic heuristic plan takes over.

use crate::config::Settings;
use crate::director::client::{LlmClient, LlmRequest};
use crate::director::plan::{
    Plan, PlanAction, PlanSection, Role, Section, StyleToken,
};
use crate::director::prompt::{build_prompts, estimate_max_tokens, DirectorRole, PromptContext};
use crate::director::stream::PlanAssembler;
use crate::stage::{CameraView, LightPreset, Mood};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const FALLBACK_GESTURES: [&str; 5] = ["handup", "side", "ok", "index", "shrug"];

#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub sections: Vec<Section>,
    pub duration_ms: u64,
    pub style: StyleToken,
    pub seed: String,
    pub default_light: LightPreset,
    pub default_camera: CameraView,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm: Settings,
    pub parallel_stage_camera: bool,
    /// Above this many sections, Performance runs in chunks.
    pub chunk_threshold: usize,
    pub chunk_size: usize,
    /// Breather between chunk calls.
    pub chunk_pause_ms: u64,
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: Settings::default(),
            parallel_stage_camera: true,
            chunk_threshold: 8,
            chunk_size: 8,
            chunk_pause_ms: 100,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running,
    Complete,
    Failed,
    Cancelled,
}

/// Progress record pushed through the caller's hook as each stage moves.
#[derive(Debug, Clone)]
pub struct StageProgress {
    pub stage: DirectorRole,
    pub status: StageState,
    pub chunk: Option<usize>,
    pub total_chunks: Option<usize>,
    pub message: Option<String>,
    pub thoughts_preview: Option<String>,
}

type ProgressHook = Arc<dyn Fn(&StageProgress) + Send + Sync>;
type ChunkHook = Arc<dyn Fn(DirectorRole, &str) + Send + Sync>;
type ThoughtsHook = Arc<dyn Fn(DirectorRole, &str) + Send + Sync>;

#[derive(Default, Clone)]
pub struct PipelineHooks {
    pub on_progress: Option<ProgressHook>,
    pub on_chunk: Option<ChunkHook>,
    pub on_thoughts: Option<ThoughtsHook>,
}

impl PipelineHooks {
    fn progress(&self, record: StageProgress) {
        if let Some(hook) = &self.on_progress {
            hook(&record);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectorRunReport {
    pub role: DirectorRole,
    pub status: StageState,
    pub elapsed_ms: u64,
    pub thoughts: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub plan: Plan,
    pub performance: DirectorRunReport,
    pub stage: Option<DirectorRunReport>,
    pub camera: Option<DirectorRunReport>,
    pub total_ms: u64,
    pub used_fallback: bool,
}

pub struct DirectorPipeline {
    client: LlmClient,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl DirectorPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let client = LlmClient::new(&config.llm);
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token shared by every in-flight director call; `cancel()` aborts them
    /// all between one await point and the next.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn run(&self, input: &PipelineInput, hooks: &PipelineHooks) -> PipelineOutcome {
        let started = Instant::now();

        let (perf_plan, perf_report) = self.run_performance(input, hooks).await;

        let Some(perf_plan) = perf_plan else {
            // Nothing usable from the lead director; the show still happens.
            let status = perf_report.status;
            hooks.progress(StageProgress {
                stage: DirectorRole::Performance,
                status,
                chunk: None,
                total_chunks: None,
                message: Some("using heuristic fallback plan".to_string()),
                thoughts_preview: None,
            });
            warn!("[DIRECTOR] performance unusable; synthesizing fallback plan");
            return PipelineOutcome {
                plan: fallback_plan(input),
                performance: perf_report,
                stage: None,
                camera: None,
                total_ms: started.elapsed().as_millis() as u64,
                used_fallback: true,
            };
        };

        let (stage_result, camera_result) = if self.cancel.is_cancelled() {
            (None, None)
        } else if self.config.parallel_stage_camera {
            let stage_fut = self.run_role(DirectorRole::Stage, input, hooks, Some(&perf_plan), None);
            let camera_fut =
                self.run_role(DirectorRole::Camera, input, hooks, Some(&perf_plan), None);
            let (s, c) = tokio::join!(stage_fut, camera_fut);
            (Some(s), Some(c))
        } else {
            let s = self
                .run_role(DirectorRole::Stage, input, hooks, Some(&perf_plan), None)
                .await;
            // Sequential mode lets the camera director see the stage plan.
            let c = self
                .run_role(
                    DirectorRole::Camera,
                    input,
                    hooks,
                    Some(&perf_plan),
                    s.0.as_ref(),
                )
                .await;
            (Some(s), Some(c))
        };

        let (stage_plan, stage_report) = match stage_result {
            Some((plan, report)) => (plan, Some(report)),
            None => (None, None),
        };
        let (camera_plan, camera_report) = match camera_result {
            Some((plan, report)) => (plan, Some(report)),
            None => (None, None),
        };

        let plan = merge_plans(
            input,
            perf_plan,
            stage_plan.as_ref(),
            camera_plan.as_ref(),
        );

        info!(
            "[DIRECTOR] pipeline complete: {} sections in {} ms",
            plan.sections.len(),
            started.elapsed().as_millis()
        );

        PipelineOutcome {
            plan,
            performance: perf_report,
            stage: stage_report,
            camera: camera_report,
            total_ms: started.elapsed().as_millis() as u64,
            used_fallback: false,
        }
    }

    /// Performance, chunked when the song has many sections. Chunk results
    /// concatenate in order; window timestamps are already absolute.
    async fn run_performance(
        &self,
        input: &PipelineInput,
        hooks: &PipelineHooks,
    ) -> (Option<Plan>, DirectorRunReport) {
        let started = Instant::now();

        if input.sections.len() <= self.config.chunk_threshold {
            let (plan, report) = self
                .run_role(DirectorRole::Performance, input, hooks, None, None)
                .await;
            return (plan, report);
        }

        let chunks: Vec<&[Section]> = input.sections.chunks(self.config.chunk_size).collect();
        let total_chunks = chunks.len();
        let mut sections: Vec<PlanSection> = Vec::with_capacity(input.sections.len());
        let mut actions: Vec<PlanAction> = Vec::new();
        let mut title = String::new();
        let mut thoughts = None;
        let mut any_failed = false;

        for (index, chunk) in chunks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return (
                    None,
                    DirectorRunReport {
                        role: DirectorRole::Performance,
                        status: StageState::Cancelled,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        thoughts,
                        error: Some("cancelled".to_string()),
                    },
                );
            }
            if index > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.chunk_pause_ms.max(100)))
                    .await;
            }

            hooks.progress(StageProgress {
                stage: DirectorRole::Performance,
                status: StageState::Running,
                chunk: Some(index + 1),
                total_chunks: Some(total_chunks),
                message: Some(format!("chunk {}/{}", index + 1, total_chunks)),
                thoughts_preview: None,
            });

            let chunk_input = PipelineInput {
                sections: chunk.to_vec(),
                ..input.clone()
            };
            let (plan, report) = self
                .run_role(DirectorRole::Performance, &chunk_input, hooks, None, None)
                .await;
            match plan {
                Some(mut plan) => {
                    if title.is_empty() {
                        title = plan.title.clone();
                    }
                    if thoughts.is_none() {
                        thoughts = report.thoughts.clone();
                    }
                    sections.append(&mut plan.sections);
                    actions.append(&mut plan.actions);
                }
                None => {
                    any_failed = true;
                    warn!(
                        "[DIRECTOR] performance chunk {}/{} failed: {:?}",
                        index + 1,
                        total_chunks,
                        report.error
                    );
                }
            }
        }

        let status = if sections.is_empty() {
            StageState::Failed
        } else {
            StageState::Complete
        };
        let report = DirectorRunReport {
            role: DirectorRole::Performance,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            thoughts,
            error: any_failed.then(|| "one or more chunks failed".to_string()),
        };
        if sections.is_empty() {
            return (None, report);
        }

        actions.sort_by_key(|a| a.time_ms);
        (
            Some(Plan {
                title,
                duration_ms: input.duration_ms,
                sections,
                actions,
            }),
            report,
        )
    }

    /// One director call: prompt, stream into the assembler, parse, report.
    async fn run_role(
        &self,
        role: DirectorRole,
        input: &PipelineInput,
        hooks: &PipelineHooks,
        performance: Option<&Plan>,
        stage: Option<&Plan>,
    ) -> (Option<Plan>, DirectorRunReport) {
        let started = Instant::now();
        hooks.progress(StageProgress {
            stage: role,
            status: StageState::Running,
            chunk: None,
            total_chunks: None,
            message: None,
            thoughts_preview: None,
        });

        let ctx = PromptContext {
            sections: &input.sections,
            duration_ms: input.duration_ms,
            style: input.style,
            seed: &input.seed,
            default_light: input.default_light,
            default_camera: input.default_camera,
            performance,
            stage,
        };
        let (system_prompt, user_prompt) = build_prompts(role, &ctx);

        let request = LlmRequest {
            model: self.config.llm.llm_model.clone(),
            system_prompt,
            user_prompt,
            max_tokens: estimate_max_tokens(role, input.sections.len()),
            temperature: self.config.temperature,
            stream: self.config.llm.stream_responses,
            timeout_ms: self.config.llm.request_timeout_ms,
            retries: self.config.llm.request_retries,
            retry_base_ms: self.config.llm.retry_base_ms,
        };

        let mut assembler = PlanAssembler::new();
        let mut thoughts_sent = false;
        let result = {
            let hooks_ref = hooks;
            let assembler_ref = &mut assembler;
            let thoughts_flag = &mut thoughts_sent;
            let mut sink = move |delta: &str, _acc: &str| {
                let progress = assembler_ref.append(delta);
                if let Some(hook) = &hooks_ref.on_chunk {
                    hook(role, delta);
                }
                if !*thoughts_flag {
                    if let Some(summary) = &progress.thoughts_summary {
                        *thoughts_flag = true;
                        if let Some(hook) = &hooks_ref.on_thoughts {
                            hook(role, summary);
                        }
                    }
                }
            };
            self.client
                .request(&request, Some(&mut sink), &self.cancel)
                .await
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(response) => {
                // Non-streamed responses arrive whole.
                if assembler.buffer().is_empty() {
                    assembler.append(&response.content);
                }
                match assembler.finish(input.duration_ms) {
                    Ok(parsed) if parsed.plan.is_some() => {
                        hooks.progress(StageProgress {
                            stage: role,
                            status: StageState::Complete,
                            chunk: None,
                            total_chunks: None,
                            message: None,
                            thoughts_preview: parsed.thoughts_summary.clone(),
                        });
                        (
                            parsed.plan,
                            DirectorRunReport {
                                role,
                                status: StageState::Complete,
                                elapsed_ms,
                                thoughts: parsed.thoughts_summary,
                                error: None,
                            },
                        )
                    }
                    Ok(parsed) => self.report_failure(
                        role,
                        hooks,
                        elapsed_ms,
                        parsed.thoughts_summary,
                        "response parsed but contained no sections".to_string(),
                        StageState::Failed,
                    ),
                    Err(e) => self.report_failure(
                        role,
                        hooks,
                        elapsed_ms,
                        None,
                        e.to_string(),
                        StageState::Failed,
                    ),
                }
            }
            Err(e) => {
                let status = if self.cancel.is_cancelled() {
                    StageState::Cancelled
                } else {
                    StageState::Failed
                };
                self.report_failure(role, hooks, elapsed_ms, None, e.to_string(), status)
            }
        }
    }

    fn report_failure(
        &self,
        role: DirectorRole,
        hooks: &PipelineHooks,
        elapsed_ms: u64,
        thoughts: Option<String>,
        error: String,
        status: StageState,
    ) -> (Option<Plan>, DirectorRunReport) {
        warn!("[DIRECTOR] {} failed: {}", role, error);
        hooks.progress(StageProgress {
            stage: role,
            status,
            chunk: None,
            total_chunks: None,
            message: Some(error.clone()),
            thoughts_preview: None,
        });
        (
            None,
            DirectorRunReport {
                role,
                status,
                elapsed_ms,
                thoughts,
                error: Some(error),
            },
        )
    }
}

/// Zip the three partial plans into one. Performance owns role, mood, notes
/// and its actions; Stage contributes lights; Camera contributes views; all
/// actions concatenate and sort by time.
fn merge_plans(
    input: &PipelineInput,
    perf: Plan,
    stage: Option<&Plan>,
    camera: Option<&Plan>,
) -> Plan {
    let mut sections = Vec::with_capacity(perf.sections.len());

    for (i, base) in perf.sections.into_iter().enumerate() {
        let stage_section = stage.and_then(|p| p.sections.get(i));
        let camera_section = camera.and_then(|p| p.sections.get(i));

        let mut actions = base.actions.clone();
        if let Some(s) = stage_section {
            actions.extend(s.actions.iter().cloned());
        }
        if let Some(c) = camera_section {
            actions.extend(c.actions.iter().cloned());
        }
        actions.sort_by_key(|a| a.time_ms);

        sections.push(PlanSection {
            light: stage_section
                .and_then(|s| s.light)
                .or(base.light)
                .or(Some(input.default_light)),
            camera: camera_section
                .and_then(|c| c.camera)
                .or(base.camera)
                .or(Some(input.default_camera)),
            actions,
            ..base
        });
    }

    let mut actions = perf.actions;
    if let Some(s) = stage {
        actions.extend(s.actions.iter().cloned());
    }
    if let Some(c) = camera {
        actions.extend(c.actions.iter().cloned());
    }
    actions.sort_by_key(|a| a.time_ms);

    Plan {
        title: perf.title,
        duration_ms: input.duration_ms,
        sections,
        actions,
    }
}

/// Deterministic stand-in plan: rotate the closed vocabularies by section
/// index, drop a gesture at 40% of any section longer than three seconds,
/// and mark every third section ensemble.
pub fn fallback_plan(input: &PipelineInput) -> Plan {
    let moods = Mood::ALL;
    let views = CameraView::ALL;
    let lights = LightPreset::DIRECTABLE;

    let sections = input
        .sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let window = section.end_ms - section.start_ms;
            let mut actions = Vec::new();
            if window > 3_000 {
                let gesture = FALLBACK_GESTURES[i % FALLBACK_GESTURES.len()];
                actions.push(PlanAction {
                    time_ms: section.start_ms + (window as f64 * 0.4) as u64,
                    action: "play_gesture".to_string(),
                    args: json!({ "name": gesture, "duration": 3.0 }),
                });
            }
            PlanSection {
                label: format!("section {}", i + 1),
                start_ms: section.start_ms,
                end_ms: section.end_ms,
                role: if (i + 1) % 3 == 0 {
                    Role::Ensemble
                } else {
                    Role::Solo
                },
                mood: Some(moods[i % moods.len()]),
                camera: Some(views[i % views.len()]),
                light: Some(lights[i % lights.len()]),
                fx: None,
                notes: None,
                actions,
            }
        })
        .collect();

    Plan {
        title: "heuristic performance".to_string(),
        duration_ms: input.duration_ms,
        sections,
        actions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(n: usize, window_ms: u64) -> PipelineInput {
        let sections = (0..n)
            .map(|i| {
                Section::new(
                    i as u64 * window_ms,
                    (i as u64 + 1) * window_ms,
                    &format!("line {}", i),
                )
            })
            .collect();
        PipelineInput {
            sections,
            duration_ms: n as u64 * window_ms,
            style: StyleToken::Cinematic,
            seed: "fixed-seed".to_string(),
            default_light: LightPreset::Spotlight,
            default_camera: CameraView::Full,
        }
    }

    #[test]
    fn fallback_rotates_vocabularies_by_index() {
        let plan = fallback_plan(&input(6, 5000));
        assert_eq!(plan.sections.len(), 6);
        assert_eq!(plan.sections[0].mood, Some(Mood::Neutral));
        assert_eq!(plan.sections[1].mood, Some(Mood::Happy));
        assert_eq!(plan.sections[0].camera, Some(CameraView::Full));
        assert_eq!(plan.sections[4].camera, Some(CameraView::Full));
        assert_eq!(plan.sections[0].light, Some(LightPreset::Neon));
        assert_eq!(plan.sections[1].light, Some(LightPreset::Noir));
    }

    #[test]
    fn fallback_marks_every_third_section_ensemble() {
        let plan = fallback_plan(&input(6, 5000));
        let roles: Vec<Role> = plan.sections.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::Solo,
                Role::Solo,
                Role::Ensemble,
                Role::Solo,
                Role::Solo,
                Role::Ensemble
            ]
        );
    }

    #[test]
    fn fallback_injects_gesture_into_long_sections() {
        let plan = fallback_plan(&input(2, 5000));
        let first = &plan.sections[0];
        assert_eq!(first.actions.len(), 1);
        assert_eq!(first.actions[0].action, "play_gesture");
        assert_eq!(first.actions[0].time_ms, 2000);

        let short = fallback_plan(&input(2, 2000));
        assert!(short.sections[0].actions.is_empty());
    }

    #[test]
    fn merge_prefers_stage_lights_and_camera_views() {
        let inp = input(2, 5000);
        let mut perf = fallback_plan(&inp);
        for s in &mut perf.sections {
            s.light = None;
            s.camera = None;
        }

        let mut stage = perf.clone();
        stage.sections[0].light = Some(LightPreset::Crimson);
        let mut camera = perf.clone();
        camera.sections[1].camera = Some(CameraView::Head);

        let merged = merge_plans(&inp, perf, Some(&stage), Some(&camera));
        assert_eq!(merged.sections[0].light, Some(LightPreset::Crimson));
        // Unfilled slots fall through to the defaults.
        assert_eq!(merged.sections[1].light, Some(LightPreset::Spotlight));
        assert_eq!(merged.sections[1].camera, Some(CameraView::Head));
        assert_eq!(merged.sections[0].camera, Some(CameraView::Full));
    }

    #[test]
    fn merge_concatenates_and_sorts_actions() {
        let inp = input(1, 10_000);
        let mut perf = fallback_plan(&inp);
        perf.sections[0].actions = vec![PlanAction {
            time_ms: 9000,
            action: "set_mood".to_string(),
            args: json!({"mood": "happy"}),
        }];
        let mut camera = perf.clone();
        camera.sections[0].actions = vec![PlanAction {
            time_ms: 100,
            action: "camera_punch".to_string(),
            args: json!({}),
        }];

        let merged = merge_plans(&inp, perf, None, Some(&camera));
        let times: Vec<u64> = merged.sections[0].actions.iter().map(|a| a.time_ms).collect();
        assert_eq!(times, vec![100, 9000]);
    }
}
