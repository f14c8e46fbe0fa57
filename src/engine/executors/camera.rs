// SERENADE Camera Executor - view transitions, movements and shake
// Copyright (c) 2026 SERENADE Project

use crate::engine::executors::{arg_f32, arg_u64, LayerExecutor, StageContext};
use crate::stage::{CameraRig, CameraView};
use crate::timeline::{Block, CameraData, CameraMovement, Easing, LayerData, LayerId};
use rand::Rng;
use serde_json::Value;
use std::f32::consts::{PI, TAU};

const TRANSITION_MS: f64 = 500.0;
const DEFAULT_SHAKE_HZ: f32 = 15.0;

/// Preset orbit-camera pose for each framing.
pub fn view_pose(view: CameraView) -> CameraRig {
    let (distance, y, rotate_x) = match view {
        CameraView::Full => (1.2, 0.0, 0.0),
        CameraView::Mid => (0.8, 0.05, 0.0),
        CameraView::Upper => (0.5, 0.1, 0.0),
        CameraView::Head => (0.3, 0.15, 0.0),
    };
    CameraRig {
        distance,
        x: 0.0,
        y,
        rotate_x,
        rotate_y: 0.0,
    }
}

struct ShakeState {
    phase_x: f32,
    phase_y: f32,
    phase_r: f32,
    frequency: f32,
    intensity: f32,
}

impl ShakeState {
    fn new(intensity: f32, frequency: f32) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            phase_x: rng.gen::<f32>() * TAU,
            phase_y: rng.gen::<f32>() * TAU,
            phase_r: rng.gen::<f32>() * TAU,
            frequency,
            intensity,
        }
    }

    fn advance(&mut self, delta_ms: f64) {
        let dt = delta_ms as f32 / 1000.0;
        // Two incommensurate rates per axis so the wobble never loops cleanly.
        self.phase_x += dt * self.frequency * TAU;
        self.phase_y += dt * self.frequency * 1.27 * TAU;
        self.phase_r += dt * self.frequency * 0.73 * TAU;
    }

    fn apply(&self, pose: &mut CameraRig, decay: f32) {
        let amp = self.intensity * decay.clamp(0.0, 1.0);
        pose.x += amp * 0.05 * self.phase_x.sin();
        pose.y += amp * 0.05 * self.phase_y.sin();
        pose.rotate_x += amp * 0.02 * self.phase_r.sin();
        pose.rotate_y += amp * 0.02 * (self.phase_r * 0.9).cos();
    }
}

/// Takes the top-priority active block, runs a 500 ms ease-in-out transition
/// whenever the winner changes, then layers the block's movement on top.
pub struct CameraExecutor {
    active_block: Option<String>,
    transition_from: CameraRig,
    transition_target: CameraRig,
    transition_elapsed: f64,
    shake: Option<ShakeState>,
    /// Shake requested via cross-layer action, time-bounded.
    action_shake: Option<(ShakeState, f64, f64)>,
}

impl Default for CameraExecutor {
    fn default() -> Self {
        let pose = view_pose(CameraView::Full);
        Self {
            active_block: None,
            transition_from: pose,
            transition_target: pose,
            transition_elapsed: TRANSITION_MS,
            shake: None,
            action_shake: None,
        }
    }
}

impl CameraExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_transition(&mut self, from: CameraRig, target: CameraRig) {
        self.transition_from = from;
        self.transition_target = target;
        self.transition_elapsed = 0.0;
    }

    fn transition_pose(&self) -> CameraRig {
        let k = Easing::EaseInOut.eval((self.transition_elapsed / TRANSITION_MS) as f32);
        lerp_rig(&self.transition_from, &self.transition_target, k)
    }
}

impl LayerExecutor for CameraExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Camera
    }

    fn update(
        &mut self,
        time_ms: f64,
        delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        let winner = active.iter().find_map(|b| match &b.data {
            LayerData::Camera(data) => Some((*b, data)),
            _ => None,
        });

        if let Some((block, data)) = winner {
            if self.active_block.as_deref() != Some(block.id.as_str()) {
                self.active_block = Some(block.id.clone());
                let mut target = view_pose(data.view);
                if data.movement == CameraMovement::Static {
                    if let Some(d) = data.distance {
                        target.distance = d;
                    }
                    if let Some(rx) = data.rotate_x {
                        target.rotate_x = rx.to_radians();
                    }
                }
                let from = *ctx.head.camera_mut();
                self.begin_transition(from, target);

                if data.movement == CameraMovement::Shake {
                    self.shake = Some(ShakeState::new(
                        data.intensity.unwrap_or(0.5),
                        data.frequency.unwrap_or(DEFAULT_SHAKE_HZ),
                    ));
                }
            }
        }

        self.transition_elapsed = (self.transition_elapsed + delta_ms).min(TRANSITION_MS);
        let mut pose = self.transition_pose();

        if let Some((block, data)) = winner {
            let progress = block.progress_at(time_ms);
            let eased = block.ease_in.unwrap_or(Easing::EaseInOut).eval(progress);
            match data.movement {
                CameraMovement::Static | CameraMovement::Shake => {}
                CameraMovement::Dolly => {
                    pose.distance += data.distance.unwrap_or(0.2) * eased;
                }
                CameraMovement::Pan => {
                    pose.rotate_y += data.rotate_y.unwrap_or(15.0).to_radians() * eased;
                }
                CameraMovement::Tilt => {
                    pose.rotate_x += data.rotate_x.unwrap_or(10.0).to_radians() * eased;
                }
                CameraMovement::Orbit => {
                    pose.rotate_y += data.orbit.unwrap_or(30.0).to_radians() * eased;
                    if let Some(d) = data.distance {
                        pose.distance += (d - pose.distance) * eased;
                    }
                }
                CameraMovement::Punch => {
                    pose.distance -= data.punch.unwrap_or(0.15) * (PI * progress).sin();
                }
                CameraMovement::Sweep => {
                    let a0 = data.start_angle.unwrap_or(-20.0);
                    let a1 = data.end_angle.unwrap_or(20.0);
                    pose.rotate_y = (a0 + (a1 - a0) * eased).to_radians();
                }
            }

            if data.movement == CameraMovement::Shake {
                if let Some(shake) = &mut self.shake {
                    shake.advance(delta_ms);
                    shake.apply(&mut pose, 1.0 - progress);
                }
            }
        } else {
            // Winner gone; block-driven shake dies with it.
            self.shake = None;
            self.active_block = None;
        }

        if let Some((shake, remaining, total)) = &mut self.action_shake {
            shake.advance(delta_ms);
            *remaining -= delta_ms;
            let decay = (*remaining / *total).clamp(0.0, 1.0) as f32;
            shake.apply(&mut pose, decay);
        }
        if matches!(&self.action_shake, Some((_, remaining, _)) if *remaining <= 0.0) {
            self.action_shake = None;
        }

        *ctx.head.camera_mut() = pose;
    }

    fn stop(&mut self, ctx: &mut StageContext<'_>) {
        *self = Self::default();
        *ctx.head.camera_mut() = view_pose(CameraView::Full);
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        self.active_block = None;
        self.shake = None;
        self.action_shake = None;
    }

    fn execute_action(&mut self, action: &str, args: &Value, ctx: &mut StageContext<'_>) {
        match action {
            "set_view" => {
                if let Some(view) = args
                    .get("view")
                    .and_then(Value::as_str)
                    .and_then(CameraView::parse)
                {
                    let from = *ctx.head.camera_mut();
                    self.begin_transition(from, view_pose(view));
                }
            }
            "camera_shake" => {
                let duration = arg_u64(args, "duration_ms")
                    .or_else(|| arg_u64(args, "t"))
                    .unwrap_or(800) as f64;
                let shake = ShakeState::new(
                    arg_f32(args, "intensity").unwrap_or(0.5),
                    arg_f32(args, "frequency").unwrap_or(DEFAULT_SHAKE_HZ),
                );
                self.action_shake = Some((shake, duration, duration));
            }
            "look_at" => {
                let x = arg_f32(args, "x").unwrap_or(0.0);
                let y = arg_f32(args, "y").unwrap_or(0.0);
                let t = arg_u64(args, "t").unwrap_or(500);
                ctx.head.look_at(x, y, t);
            }
            "look_at_camera" => {
                let t = arg_u64(args, "t").unwrap_or(1000);
                ctx.head.look_at_camera(t);
            }
            "make_eye_contact" => {
                ctx.head.look_at_camera(arg_u64(args, "t").unwrap_or(800));
            }
            other => {
                tracing::warn!("[ENGINE] camera executor ignoring action '{}'", other);
            }
        }
    }
}

fn lerp_rig(from: &CameraRig, to: &CameraRig, k: f32) -> CameraRig {
    let mix = |a: f32, b: f32| a + (b - a) * k;
    CameraRig {
        distance: mix(from.distance, to.distance),
        x: mix(from.x, to.x),
        y: mix(from.y, to.y),
        rotate_x: mix(from.rotate_x, to.rotate_x),
        rotate_y: mix(from.rotate_y, to.rotate_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Head, HeadCall, NullEffects, RecordingHead};
    use serde_json::json;

    fn camera_block(id: &str, view: CameraView, movement: CameraMovement) -> Block {
        Block::new(
            id,
            0,
            2000,
            LayerData::Camera(CameraData {
                view,
                movement,
                ..Default::default()
            }),
        )
    }

    fn run(exec: &mut CameraExecutor, head: &mut RecordingHead, blocks: &[&Block], until_ms: f64) {
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let mut t = 0.0;
        while t <= until_ms {
            exec.update(
                t,
                16.0,
                blocks,
                &mut StageContext {
                    head: &mut *head,
                    effects: &mut fxs,
                    outbox: &mut outbox,
                },
            );
            t += 16.0;
        }
    }

    #[test]
    fn view_presets_match_the_table() {
        assert_eq!(view_pose(CameraView::Full).distance, 1.2);
        assert_eq!(view_pose(CameraView::Mid).y, 0.05);
        assert_eq!(view_pose(CameraView::Upper).distance, 0.5);
        assert_eq!(view_pose(CameraView::Head).y, 0.15);
    }

    #[test]
    fn transition_settles_on_the_view_pose() {
        let mut exec = CameraExecutor::new();
        let mut head = RecordingHead::new();
        let block = camera_block("c1", CameraView::Head, CameraMovement::Static);
        run(&mut exec, &mut head, &[&block], 700.0);
        let rig = head.camera_mut();
        assert!((rig.distance - 0.3).abs() < 1e-3);
        assert!((rig.y - 0.15).abs() < 1e-3);
    }

    #[test]
    fn dolly_pushes_distance_over_the_block() {
        let mut exec = CameraExecutor::new();
        let mut head = RecordingHead::new();
        let mut block = camera_block("c1", CameraView::Full, CameraMovement::Dolly);
        if let LayerData::Camera(data) = &mut block.data {
            data.distance = Some(0.4);
        }
        run(&mut exec, &mut head, &[&block], 1999.0);
        // Transition holds 1.2, dolly adds up to 0.4 as progress nears 1.
        assert!(head.camera_mut().distance > 1.5);
    }

    #[test]
    fn shake_decays_to_nothing() {
        let mut exec = CameraExecutor::new();
        let mut head = RecordingHead::new();
        let mut block = camera_block("c1", CameraView::Full, CameraMovement::Shake);
        if let LayerData::Camera(data) = &mut block.data {
            data.intensity = Some(1.0);
        }
        run(&mut exec, &mut head, &[&block], 1999.0);
        // At the end of the block decay is ~0; pose is back at the preset.
        let rig = head.camera_mut();
        assert!((rig.x).abs() < 0.01);
        assert!((rig.y).abs() < 0.01);
    }

    #[test]
    fn look_at_actions_forward_to_the_head() {
        let mut exec = CameraExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.execute_action("look_at_camera", &json!({"t": 600}), &mut ctx);
        drop(ctx);
        assert_eq!(head.calls, vec![HeadCall::LookAtCamera(600)]);
    }

    #[test]
    fn sweep_sets_absolute_rotation() {
        let mut exec = CameraExecutor::new();
        let mut head = RecordingHead::new();
        let mut block = camera_block("c1", CameraView::Full, CameraMovement::Sweep);
        if let LayerData::Camera(data) = &mut block.data {
            data.start_angle = Some(0.0);
            data.end_angle = Some(90.0);
        }
        run(&mut exec, &mut head, &[&block], 1999.0);
        let ry = head.camera_mut().rotate_y;
        assert!((ry - 90f32.to_radians()).abs() < 0.05, "rotate_y = {}", ry);
    }
}
