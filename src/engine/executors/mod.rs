// SERENADE Layer Executors
// Copyright (c) 2026 SERENADE Project
//
// One executor per track. Each owns a small state machine and is the only
// thing that mutates its slice of the external rig. Executors never hold
// references to blocks across ticks except to dedupe one-shot firings, and
// they never talk to each other directly; cross-layer traffic goes through
// the engine's trigger router into `execute_action`.

pub mod blendshape;
pub mod camera;
pub mod dance;
pub mod emoji;
pub mod fx;
pub mod lighting;
pub mod viseme;

pub use blendshape::BlendshapeExecutor;
pub use camera::CameraExecutor;
pub use dance::DanceExecutor;
pub use emoji::EmojiExecutor;
pub use fx::FxExecutor;
pub use lighting::LightingExecutor;
pub use viseme::VisemeExecutor;

use crate::engine::events::{EngineEvent, EngineState};
use crate::error::EngineError;
use crate::stage::{Effects, Head};
use crate::timeline::{Block, LayerId, Timeline};
use serde_json::Value;
use tracing::warn;

/// Mutable view of the external world handed to an executor for the span of
/// one call. The engine owns the Head and Effects; executors only borrow.
pub struct StageContext<'a> {
    pub head: &'a mut dyn Head,
    pub effects: &'a mut dyn Effects,
    /// Events the executor wants the engine to publish after this call.
    pub outbox: &'a mut Vec<EngineEvent>,
}

/// Per-layer lifecycle. `update` runs every tick with that layer's active
/// blocks, sorted so index 0 is the deterministic winner
/// (earlier start, then id).
pub trait LayerExecutor {
    fn layer(&self) -> LayerId;

    /// Pre-fetch whatever the layer needs before playback. Failure puts the
    /// engine into its error state.
    fn load_resources(
        &mut self,
        _timeline: &Timeline,
        _ctx: &mut StageContext<'_>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn update(&mut self, time_ms: f64, delta_ms: f64, active: &[&Block], ctx: &mut StageContext<'_>);

    fn pause(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Reset every piece of external state this layer owns.
    fn stop(&mut self, _ctx: &mut StageContext<'_>) {}

    /// Drop per-block caches so still-active blocks re-fire after the jump.
    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {}

    fn on_state_change(&mut self, _state: EngineState, _ctx: &mut StageContext<'_>) {}

    /// Cross-layer trigger entry point.
    fn execute_action(&mut self, action: &str, _args: &Value, _ctx: &mut StageContext<'_>) {
        warn!(
            "[ENGINE] {} executor ignoring unknown action '{}'",
            self.layer(),
            action
        );
    }

    fn dispose(&mut self, ctx: &mut StageContext<'_>) {
        self.stop(ctx);
    }
}

pub(crate) fn arg_f32(args: &Value, key: &str) -> Option<f32> {
    args.get(key).and_then(Value::as_f64).map(|n| n as f32)
}

pub(crate) fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_f64).map(|n| n.max(0.0) as u64)
}

pub(crate) fn arg_str<'v>(args: &'v Value, key: &str) -> Option<&'v str> {
    args.get(key).and_then(Value::as_str)
}
