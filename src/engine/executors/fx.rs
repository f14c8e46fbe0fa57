// SERENADE FX Executor - stacking post effects
// Copyright (c) 2026 SERENADE Project

use crate::director::plan::FxKind;
use crate::engine::executors::{LayerExecutor, StageContext};
use crate::timeline::{Block, Easing, FxData, FxKeyframe, FxValue, LayerData, LayerId};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Effects stack: every active fx block applies each frame, and any effect
/// type that vanished from the active set is put back to neutral before the
/// frame ends.
#[derive(Default)]
pub struct FxExecutor {
    applied: HashSet<FxKind>,
}

impl FxExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayerExecutor for FxExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Fx
    }

    fn update(
        &mut self,
        time_ms: f64,
        _delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        let mut present: HashSet<FxKind> = HashSet::new();

        for block in active {
            let LayerData::Fx(data) = &block.data else {
                continue;
            };
            let fade = block.fade_factor(time_ms);
            let params = sample_params(data, block, time_ms);
            apply_effect(ctx, data.effect, &params, fade);
            present.insert(data.effect);
        }

        // Anything we touched last frame that is gone now goes neutral.
        for kind in self.applied.difference(&present) {
            reset_effect(ctx, *kind);
        }
        self.applied = present;
    }

    fn stop(&mut self, ctx: &mut StageContext<'_>) {
        ctx.effects.reset_effects();
        self.applied.clear();
    }

    fn seek(&mut self, _time_ms: f64, ctx: &mut StageContext<'_>) {
        ctx.effects.reset_effects();
        self.applied.clear();
    }

    fn execute_action(&mut self, action: &str, _args: &Value, ctx: &mut StageContext<'_>) {
        match action {
            "post_reset" => {
                ctx.effects.reset_effects();
                self.applied.clear();
            }
            other => {
                tracing::warn!("[ENGINE] fx executor ignoring action '{}'", other);
            }
        }
    }
}

/// Parameter snapshot for this frame: keyframe interpolation when keyframes
/// exist, static params otherwise. Numbers lerp under the block easing;
/// flags snap to the upcoming keyframe's value.
fn sample_params(data: &FxData, block: &Block, time_ms: f64) -> BTreeMap<String, FxValue> {
    if data.keyframes.is_empty() {
        return data.params.clone();
    }
    let progress = block.progress_at(time_ms);
    interpolate_fx_keyframes(&data.keyframes, block.ease_in.unwrap_or_default(), progress)
}

fn interpolate_fx_keyframes(
    keyframes: &[FxKeyframe],
    block_easing: Easing,
    progress: f32,
) -> BTreeMap<String, FxValue> {
    let first = match keyframes.first() {
        Some(k) => k,
        None => return BTreeMap::new(),
    };
    if progress <= first.offset {
        return first.params.clone();
    }
    let last = keyframes.last().expect("non-empty");
    if progress >= last.offset {
        return last.params.clone();
    }

    let mut lo = first;
    let mut hi = last;
    for pair in keyframes.windows(2) {
        if pair[0].offset <= progress && progress <= pair[1].offset {
            lo = &pair[0];
            hi = &pair[1];
            break;
        }
    }

    let span = (hi.offset - lo.offset).max(f32::EPSILON);
    let k = hi
        .easing
        .or(lo.easing)
        .unwrap_or(block_easing)
        .eval((progress - lo.offset) / span);

    let mut out = BTreeMap::new();
    let names: HashSet<&String> = lo.params.keys().chain(hi.params.keys()).collect();
    for name in names {
        let a = lo.params.get(name);
        let b = hi.params.get(name);
        let value = match (a, b) {
            (Some(FxValue::Number(x)), Some(FxValue::Number(y))) => {
                FxValue::Number(x + (y - x) * k as f64)
            }
            // Booleans take the next keyframe's value.
            (_, Some(FxValue::Flag(flag))) => FxValue::Flag(*flag),
            (Some(v), _) => *v,
            (None, Some(v)) => *v,
            (None, None) => continue,
        };
        out.insert(name.clone(), value);
    }
    out
}

fn number(params: &BTreeMap<String, FxValue>, key: &str, default: f64) -> f32 {
    params
        .get(key)
        .and_then(FxValue::as_number)
        .unwrap_or(default) as f32
}

fn flag(params: &BTreeMap<String, FxValue>, key: &str) -> bool {
    params.get(key).and_then(FxValue::as_flag).unwrap_or(false)
}

fn apply_effect(
    ctx: &mut StageContext<'_>,
    kind: FxKind,
    params: &BTreeMap<String, FxValue>,
    fade: f32,
) {
    match kind {
        FxKind::Bloom => ctx.effects.set_bloom(
            number(params, "strength", 1.5) * fade,
            number(params, "radius", 0.4),
            number(params, "threshold", 0.85),
        ),
        FxKind::Vignette => ctx.effects.set_vignette(
            number(params, "darkness", 1.1) * fade,
            number(params, "offset", 1.0),
        ),
        FxKind::Chromatic => ctx
            .effects
            .set_chromatic_aberration(number(params, "offset", 0.002) * fade),
        FxKind::Glitch => ctx
            .effects
            .set_glitch(number(params, "intensity", 0.3) * fade, flag(params, "wild")),
        // Pixelation inverts: effective size scales with (2 - fade).
        FxKind::Pixelation => ctx
            .effects
            .set_pixelation(number(params, "size", 6.0) * (2.0 - fade)),
    }
}

fn reset_effect(ctx: &mut StageContext<'_>, kind: FxKind) {
    match kind {
        FxKind::Bloom => ctx.effects.set_bloom(0.0, 0.0, 1.0),
        FxKind::Vignette => ctx.effects.set_vignette(0.0, 1.0),
        FxKind::Chromatic => ctx.effects.set_chromatic_aberration(0.0),
        FxKind::Glitch => ctx.effects.set_glitch(0.0, false),
        FxKind::Pixelation => ctx.effects.set_pixelation(1.0),
    }
}
