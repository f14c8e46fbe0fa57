// SERENADE Show Runner - plan in, playback out
// Copyright (c) 2026 SERENADE Project
//
// The runner is the seam between the kernel and whoever is hosting it: it
// compiles plans, feeds the engine, exposes transport controls, persists
// timelines, and bridges engine events outward. The editor collaborator
// talks to the engine only through here.

use crate::director::plan::{Plan, PlanAction};
use crate::engine::{EngineEvent, EngineState, EventKind, ListenerId, PerformanceEngine};
use crate::error::SerenadeError;
use crate::stage::{Effects, Head};
use crate::timeline::{compile, CompileOptions, Timeline};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const AUTOSAVE_DEBOUNCE_MS: u64 = 1_000;
const FRAME_INTERVAL_MS: u64 = 16;

pub struct ShowRunner {
    engine: PerformanceEngine,
    external_actions: Vec<PlanAction>,
    autosave_path: Option<PathBuf>,
    dirty_since: Option<Instant>,
}

impl ShowRunner {
    pub fn new(head: Box<dyn Head>, effects: Box<dyn Effects>) -> Self {
        Self {
            engine: PerformanceEngine::new(head, effects),
            external_actions: Vec::new(),
            autosave_path: None,
            dirty_since: None,
        }
    }

    /// Persist the timeline to this path whenever the editor reports edits,
    /// debounced so drag operations do not thrash the disk.
    pub fn with_autosave(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave_path = Some(path.into());
        self
    }

    pub fn engine(&self) -> &PerformanceEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PerformanceEngine {
        &mut self.engine
    }

    /// Verbs the compiler could not lower; the host session owns these.
    pub fn external_actions(&self) -> &[PlanAction] {
        &self.external_actions
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    pub fn load_from_plan(
        &mut self,
        plan: &Plan,
        opts: &CompileOptions,
    ) -> Result<Vec<PlanAction>, SerenadeError> {
        let show = compile(plan, opts);
        self.external_actions = show.external_actions.clone();
        self.engine.set_timeline(show.timeline)?;
        info!(
            "[RUNNER] plan '{}' loaded ({} external actions)",
            plan.title,
            self.external_actions.len()
        );
        Ok(show.external_actions)
    }

    pub fn load_timeline(&mut self, timeline: Timeline) -> Result<(), SerenadeError> {
        self.external_actions.clear();
        self.engine.set_timeline(timeline)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play(&mut self) -> Result<(), SerenadeError> {
        self.engine.play().map_err(SerenadeError::from)
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn toggle_play(&mut self) -> Result<(), SerenadeError> {
        if self.engine.state() == EngineState::Playing {
            self.engine.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    pub fn seek(&mut self, time_ms: f64) {
        self.engine.seek(time_ms);
    }

    pub fn tick(&mut self, now: Instant) {
        self.engine.tick(now);
        self.flush_autosave(now);
    }

    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&EngineEvent) + 'static,
    ) -> ListenerId {
        self.engine.on(kind, listener)
    }

    pub fn off(&mut self, id: ListenerId) {
        self.engine.off(id);
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn export_json(&self) -> Result<String, SerenadeError> {
        let timeline = self
            .engine
            .timeline()
            .ok_or(crate::error::EngineError::InvalidState("export"))?;
        Ok(serde_json::to_string_pretty(timeline)?)
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), SerenadeError> {
        let timeline: Timeline = serde_json::from_str(json)?;
        self.load_timeline(timeline)
    }

    pub fn save(&self, path: &Path) -> Result<(), SerenadeError> {
        let json = self.export_json()?;
        std::fs::write(path, json)?;
        debug!("[RUNNER] timeline saved to {}", path.display());
        Ok(())
    }

    /// Editor hook: a block changed in place. The engine picks the change up
    /// on its next frame; persistence happens after the debounce window.
    pub fn notify_blocks_edited(&mut self) {
        self.dirty_since = Some(Instant::now());
    }

    fn flush_autosave(&mut self, now: Instant) {
        let Some(path) = self.autosave_path.clone() else {
            return;
        };
        let Some(since) = self.dirty_since else {
            return;
        };
        if now.duration_since(since) >= Duration::from_millis(AUTOSAVE_DEBOUNCE_MS) {
            self.dirty_since = None;
            if let Err(e) = self.save(&path) {
                tracing::warn!("[RUNNER] autosave failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Headless playback
    // ------------------------------------------------------------------

    /// Drive the engine off a frame interval until the show ends. Used by
    /// the CLI's `perform`; cooperative single-threaded by construction.
    pub async fn run_to_completion(&mut self) -> Result<(), SerenadeError> {
        self.play()?;
        let mut frames = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS));
        while self.engine.state() == EngineState::Playing {
            frames.tick().await;
            self.tick(Instant::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::fallback_plan;
    use crate::director::pipeline::PipelineInput;
    use crate::director::plan::{Section, StyleToken};
    use crate::stage::{CameraView, LightPreset, NullEffects, NullHead};

    fn sample_plan() -> Plan {
        fallback_plan(&PipelineInput {
            sections: vec![
                Section::new(0, 4000, "line one"),
                Section::new(4000, 8000, "line two"),
            ],
            duration_ms: 8000,
            style: StyleToken::Minimal,
            seed: "s".to_string(),
            default_light: LightPreset::Spotlight,
            default_camera: CameraView::Full,
        })
    }

    fn make_runner() -> ShowRunner {
        ShowRunner::new(Box::new(NullHead::new()), Box::new(NullEffects))
    }

    #[test]
    fn plan_load_reaches_ready() {
        let mut runner = make_runner();
        runner
            .load_from_plan(&sample_plan(), &CompileOptions::default())
            .unwrap();
        assert_eq!(runner.engine().state(), EngineState::Ready);
        assert!(runner.engine().timeline().unwrap().blocks.len() >= 6);
    }

    #[test]
    fn timeline_round_trips_through_export_import() {
        let mut runner = make_runner();
        runner
            .load_from_plan(&sample_plan(), &CompileOptions::default())
            .unwrap();
        let json = runner.export_json().unwrap();
        let before = runner.engine().timeline().unwrap().clone();

        let mut other = make_runner();
        other.import_json(&json).unwrap();
        assert_eq!(other.engine().timeline().unwrap(), &before);
    }

    #[test]
    fn toggle_flips_between_play_and_pause() {
        let mut runner = make_runner();
        runner
            .load_from_plan(&sample_plan(), &CompileOptions::default())
            .unwrap();
        runner.toggle_play().unwrap();
        assert_eq!(runner.engine().state(), EngineState::Playing);
        runner.toggle_play().unwrap();
        assert_eq!(runner.engine().state(), EngineState::Paused);
    }

    #[test]
    fn export_without_timeline_is_an_error() {
        let runner = make_runner();
        assert!(runner.export_json().is_err());
    }
}
