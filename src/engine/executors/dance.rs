// SERENADE Dance Executor - body animation arbitration
// Copyright (c) 2026 SERENADE Project

use crate::engine::executors::{arg_f32, arg_str, arg_u64, LayerExecutor, StageContext};
use crate::timeline::{Block, LayerData, LayerId, Timeline};
use serde_json::Value;
use tracing::debug;

const ANIMATION_SCALE: f32 = 0.01;

/// At most one clip plays at a time: when a new dance block becomes current
/// the rig starts its clip, and when nothing is active the rig's animation
/// is stopped. Gestures and poses arrive as cross-layer actions.
#[derive(Default)]
pub struct DanceExecutor {
    current_block: Option<String>,
}

impl DanceExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayerExecutor for DanceExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Dance
    }

    fn load_resources(
        &mut self,
        timeline: &Timeline,
        _ctx: &mut StageContext<'_>,
    ) -> Result<(), crate::error::EngineError> {
        // Clips stream from the rig side; here we only warm the log with
        // what the show will ask for.
        for block in timeline.blocks_on(LayerId::Dance) {
            if let LayerData::Dance(data) = &block.data {
                debug!("[ENGINE] dance clip queued: {}", data.clip_url);
            }
        }
        Ok(())
    }

    fn update(
        &mut self,
        _time_ms: f64,
        _delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        let winner = active.iter().find_map(|b| match &b.data {
            LayerData::Dance(data) => Some((*b, data)),
            _ => None,
        });

        match winner {
            Some((block, data)) => {
                if self.current_block.as_deref() != Some(block.id.as_str()) {
                    let speed = if data.speed > 0.0 { data.speed } else { 1.0 };
                    let duration_s = block.duration_ms as f32 / 1000.0;
                    ctx.head
                        .play_animation(&data.clip_url, duration_s / speed, 0, ANIMATION_SCALE);
                    self.current_block = Some(block.id.clone());
                }
            }
            None => {
                if self.current_block.take().is_some() {
                    ctx.head.stop_animation();
                }
            }
        }
    }

    fn stop(&mut self, ctx: &mut StageContext<'_>) {
        if self.current_block.take().is_some() {
            ctx.head.stop_animation();
        }
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        // Let the next tick re-kick whatever is active at the new position.
        self.current_block = None;
    }

    fn execute_action(&mut self, action: &str, args: &Value, ctx: &mut StageContext<'_>) {
        match action {
            "play_gesture" => {
                let name = arg_str(args, "name").unwrap_or("wave");
                let duration_s = arg_f32(args, "duration").unwrap_or(3.0);
                let mirror = args
                    .get("mirror")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                ctx.head.play_gesture(name, duration_s, mirror);
            }
            "stop_gesture" => {
                ctx.head.stop_gesture(arg_u64(args, "ms").unwrap_or(1000));
            }
            "play_pose" => {
                if let Some(url) = arg_str(args, "url").or_else(|| arg_str(args, "name")) {
                    let duration_s = arg_f32(args, "duration").unwrap_or(5.0);
                    ctx.head.play_pose(url, duration_s, 0, ANIMATION_SCALE);
                }
            }
            "stop_pose" => {
                ctx.head.stop_pose();
            }
            "play_animation" => {
                if let Some(url) = arg_str(args, "url").or_else(|| arg_str(args, "clip")) {
                    let duration_s = arg_f32(args, "duration").unwrap_or(2.5);
                    ctx.head.play_animation(url, duration_s, 0, ANIMATION_SCALE);
                }
            }
            "stop_animation" => {
                self.current_block = None;
                ctx.head.stop_animation();
            }
            other => {
                tracing::warn!("[ENGINE] dance executor ignoring action '{}'", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{HeadCall, NullEffects, RecordingHead};
    use crate::timeline::DanceData;
    use serde_json::json;

    fn dance_block(id: &str, start: u64, dur: u64, url: &str, speed: f32) -> Block {
        Block::new(
            id,
            start,
            dur,
            LayerData::Dance(DanceData {
                clip_url: url.to_string(),
                speed,
            }),
        )
    }

    #[test]
    fn plays_once_per_block_and_stops_when_idle() {
        let mut exec = DanceExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = dance_block("d1", 0, 2000, "clips/spin.fbx", 1.0);

        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.update(0.0, 16.0, &[&block], &mut ctx);
        exec.update(500.0, 16.0, &[&block], &mut ctx);
        exec.update(2100.0, 16.0, &[], &mut ctx);
        drop(ctx);

        assert_eq!(
            head.calls,
            vec![
                HeadCall::PlayAnimation("clips/spin.fbx".to_string(), 2.0),
                HeadCall::StopAnimation,
            ]
        );
    }

    #[test]
    fn speed_scales_the_clip_duration() {
        let mut exec = DanceExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let block = dance_block("d1", 0, 3000, "clips/bounce.fbx", 2.0);

        exec.update(
            0.0,
            16.0,
            &[&block],
            &mut StageContext {
                head: &mut head,
                effects: &mut fxs,
                outbox: &mut outbox,
            },
        );
        assert_eq!(
            head.calls,
            vec![HeadCall::PlayAnimation("clips/bounce.fbx".to_string(), 1.5)]
        );
    }

    #[test]
    fn gesture_actions_forward_with_defaults() {
        let mut exec = DanceExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();
        let mut ctx = StageContext {
            head: &mut head,
            effects: &mut fxs,
            outbox: &mut outbox,
        };
        exec.execute_action("play_gesture", &json!({"name": "bow"}), &mut ctx);
        exec.execute_action("stop_gesture", &json!({}), &mut ctx);
        drop(ctx);

        assert_eq!(
            head.calls,
            vec![
                HeadCall::PlayGesture("bow".to_string(), 3.0, false),
                HeadCall::StopGesture(1000),
            ]
        );
    }
}
