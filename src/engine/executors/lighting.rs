// SERENADE Lighting Executor - preset fades and audio-pulsed spots
// Copyright (c) 2026 SERENADE Project

use crate::engine::executors::{LayerExecutor, StageContext};
use crate::stage::LightPreset;
use crate::timeline::{Block, LayerData, LayerId, LightLevels, LightSpec, LightTransition};
use crate::stage::LightSlot;

/// Fixed preset table. Values are load-bearing for snapshot tests; do not
/// tweak without updating them.
pub fn preset_levels(preset: LightPreset) -> LightLevels {
    let (amb, dir, spot) = match preset {
        LightPreset::Spotlight => (("#ffffff", 0.5), ("#ffffff", 1.0), ("#ffffff", 20.0)),
        LightPreset::Neon => (("#ff00ff", 0.6), ("#00ffff", 0.8), ("#ff00ff", 25.0)),
        LightPreset::Noir => (("#1a1a2e", 0.3), ("#4a4a6a", 0.6), ("#8888aa", 15.0)),
        LightPreset::Sunset => (("#ff6b35", 0.7), ("#f7c59f", 0.9), ("#ff8c42", 22.0)),
        LightPreset::Frost => (("#a8dadc", 0.6), ("#e0fbfc", 0.85), ("#3d5a80", 18.0)),
        LightPreset::Crimson => (("#660000", 0.5), ("#cc0000", 0.9), ("#ff3333", 25.0)),
    };
    LightLevels {
        ambient: LightSpec::new(amb.0, amb.1),
        direct: LightSpec::new(dir.0, dir.1),
        spot: LightSpec::new(spot.0, spot.1),
    }
}

/// Takes only the highest-priority active block. Preset changes run a fade
/// (500 ms fade, 300 ms pulse, cut immediate); colors interpolate per sRGB
/// channel, intensities linearly. An audio-pulse flag wobbles the spot.
pub struct LightingExecutor {
    current: LightLevels,
    fade_from: LightLevels,
    target: LightLevels,
    fade_elapsed: f64,
    fade_duration: f64,
    active_block: Option<String>,
    pulse_phase: f64,
}

impl Default for LightingExecutor {
    fn default() -> Self {
        let base = preset_levels(LightPreset::Spotlight);
        Self {
            current: base.clone(),
            fade_from: base.clone(),
            target: base,
            fade_elapsed: 0.0,
            fade_duration: 0.0,
            active_block: None,
            pulse_phase: 0.0,
        }
    }
}

impl LightingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_to_rig(&self, ctx: &mut StageContext<'_>, pulse: bool) {
        let rig = ctx.head.light_mut(LightSlot::Ambient);
        rig.color = self.current.ambient.color.clone();
        rig.intensity = self.current.ambient.intensity;

        let rig = ctx.head.light_mut(LightSlot::Direct);
        rig.color = self.current.direct.color.clone();
        rig.intensity = self.current.direct.intensity;

        let rig = ctx.head.light_mut(LightSlot::Spot);
        rig.color = self.current.spot.color.clone();
        rig.intensity = if pulse {
            self.current.spot.intensity * (1.0 + 0.2 * self.pulse_phase.sin() as f32)
        } else {
            self.current.spot.intensity
        };
    }
}

impl LayerExecutor for LightingExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Lighting
    }

    fn update(
        &mut self,
        _time_ms: f64,
        delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        let winner = active.iter().find_map(|b| match &b.data {
            LayerData::Lighting(data) => Some((*b, data)),
            _ => None,
        });

        let mut pulse = false;
        if let Some((block, data)) = winner {
            if self.active_block.as_deref() != Some(block.id.as_str()) {
                self.active_block = Some(block.id.clone());
                self.fade_from = self.current.clone();
                self.target = data
                    .overrides
                    .clone()
                    .unwrap_or_else(|| preset_levels(data.preset));
                self.fade_elapsed = 0.0;
                self.fade_duration = match data.transition {
                    LightTransition::Fade => LightTransition::Fade.fade_ms(),
                    LightTransition::Pulse => LightTransition::Pulse.fade_ms(),
                    LightTransition::Cut => 0.0,
                };
            }
            if data.audio_pulse {
                self.pulse_phase += delta_ms * 0.005;
                pulse = true;
            }
        }

        self.fade_elapsed += delta_ms;
        let k = if self.fade_duration <= 0.0 {
            1.0
        } else {
            (self.fade_elapsed / self.fade_duration).clamp(0.0, 1.0) as f32
        };
        self.current = lerp_levels(&self.fade_from, &self.target, k);

        self.write_to_rig(ctx, pulse);
    }

    fn stop(&mut self, ctx: &mut StageContext<'_>) {
        *self = Self::default();
        self.write_to_rig(ctx, false);
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        // Forget the current winner so the block at the new position
        // restarts its fade.
        self.active_block = None;
    }

    fn execute_action(
        &mut self,
        action: &str,
        args: &serde_json::Value,
        ctx: &mut StageContext<'_>,
    ) {
        match action {
            "set_light_preset" => {
                if let Some(preset) = args
                    .get("preset")
                    .and_then(serde_json::Value::as_str)
                    .and_then(LightPreset::parse)
                {
                    self.fade_from = self.current.clone();
                    self.target = preset_levels(preset);
                    self.fade_elapsed = 0.0;
                    self.fade_duration = LightTransition::Fade.fade_ms();
                    self.active_block = None;
                    self.write_to_rig(ctx, false);
                }
            }
            other => {
                tracing::warn!("[ENGINE] lighting executor ignoring action '{}'", other);
            }
        }
    }
}

fn lerp_levels(from: &LightLevels, to: &LightLevels, k: f32) -> LightLevels {
    LightLevels {
        ambient: lerp_spec(&from.ambient, &to.ambient, k),
        direct: lerp_spec(&from.direct, &to.direct, k),
        spot: lerp_spec(&from.spot, &to.spot, k),
    }
}

fn lerp_spec(from: &LightSpec, to: &LightSpec, k: f32) -> LightSpec {
    LightSpec {
        color: lerp_hex(&from.color, &to.color, k),
        intensity: from.intensity + (to.intensity - from.intensity) * k,
    }
}

/// Per-component linear interpolation in sRGB hex space.
fn lerp_hex(from: &str, to: &str, k: f32) -> String {
    let (fr, fg, fb) = parse_hex(from);
    let (tr, tg, tb) = parse_hex(to);
    let mix = |a: u8, b: u8| -> u8 {
        (a as f32 + (b as f32 - a as f32) * k).round().clamp(0.0, 255.0) as u8
    };
    format!("#{:02x}{:02x}{:02x}", mix(fr, tr), mix(fg, tg), mix(fb, tb))
}

fn parse_hex(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return (255, 255, 255);
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).unwrap_or(255);
    (channel(0..2), channel(2..4), channel(4..6))
}
