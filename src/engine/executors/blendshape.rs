// SERENADE Blendshape Executor - weighted morph blending and mood changes
// Copyright (c) 2026 SERENADE Project

use crate::engine::executors::{arg_f32, arg_str, LayerExecutor, StageContext};
use crate::stage::Mood;
use crate::timeline::{Block, BlendshapeData, Easing, LayerData, LayerId, MorphKeyframe};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Consumes every active blendshape block at once and blends them: per morph
/// name the output is the intensity-and-fade weighted mean across blocks.
/// Moods are deduped so the rig only hears actual changes; a block's one-shot
/// emoji fires once near its start.
#[derive(Default)]
pub struct BlendshapeExecutor {
    /// Morphs we have written, so stop() can zero them.
    touched: BTreeSet<String>,
    last_mood: Option<Mood>,
    fired_emoji: HashSet<String>,
}

impl BlendshapeExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LayerExecutor for BlendshapeExecutor {
    fn layer(&self) -> LayerId {
        LayerId::Blendshape
    }

    fn update(
        &mut self,
        time_ms: f64,
        _delta_ms: f64,
        active: &[&Block],
        ctx: &mut StageContext<'_>,
    ) {
        // (weighted sum, weight sum) per morph.
        let mut acc: BTreeMap<String, (f32, f32)> = BTreeMap::new();

        for block in active {
            let LayerData::Blendshape(data) = &block.data else {
                continue;
            };

            let weight = data.intensity * block.fade_factor(time_ms);
            let progress = block.progress_at(time_ms);

            if weight > 0.0 {
                let values = sample_morphs(data, block, progress);
                for (name, value) in values {
                    let slot = acc.entry(name).or_insert((0.0, 0.0));
                    slot.0 += value * weight;
                    slot.1 += weight;
                }
            }

            if let Some(mood) = data.mood {
                if self.last_mood != Some(mood) {
                    ctx.head.set_mood(mood);
                    self.last_mood = Some(mood);
                }
            }

            if let Some(emoji) = &data.emoji {
                if progress < 0.05 && !self.fired_emoji.contains(&block.id) {
                    ctx.head.speak_emoji(emoji);
                    self.fired_emoji.insert(block.id.clone());
                }
            }
        }

        for (name, (weighted, total)) in acc {
            if total > 0.0 {
                ctx.head.set_value(&name, weighted / total);
                self.touched.insert(name);
            }
        }
    }

    fn stop(&mut self, ctx: &mut StageContext<'_>) {
        for name in std::mem::take(&mut self.touched) {
            ctx.head.set_value(&name, 0.0);
        }
        ctx.head.set_mood(Mood::Neutral);
        self.last_mood = None;
        self.fired_emoji.clear();
    }

    fn seek(&mut self, _time_ms: f64, _ctx: &mut StageContext<'_>) {
        self.fired_emoji.clear();
    }

    fn execute_action(&mut self, action: &str, args: &Value, ctx: &mut StageContext<'_>) {
        match action {
            "set_value" => {
                if let Some(name) = arg_str(args, "name") {
                    let value = arg_f32(args, "value").unwrap_or(1.0);
                    ctx.head.set_value(name, value);
                    self.touched.insert(name.to_string());
                }
            }
            "set_mood" => {
                if let Some(mood) = arg_str(args, "mood").and_then(Mood::parse) {
                    if self.last_mood != Some(mood) {
                        ctx.head.set_mood(mood);
                        self.last_mood = Some(mood);
                    }
                }
            }
            other => {
                tracing::warn!("[ENGINE] blendshape executor ignoring action '{}'", other);
            }
        }
    }
}

/// Current morph values for one block: keyframe interpolation when keyframes
/// exist, static targets otherwise.
fn sample_morphs(data: &BlendshapeData, block: &Block, progress: f32) -> BTreeMap<String, f32> {
    if data.keyframes.is_empty() {
        return data.target_morphs.clone();
    }
    interpolate_keyframes(&data.keyframes, block.ease_in, progress)
}

fn interpolate_keyframes(
    keyframes: &[MorphKeyframe],
    block_easing: Option<Easing>,
    progress: f32,
) -> BTreeMap<String, f32> {
    let first = match keyframes.first() {
        Some(k) => k,
        None => return BTreeMap::new(),
    };
    if progress <= first.offset {
        return first.values.clone();
    }
    let last = keyframes.last().expect("non-empty");
    if progress >= last.offset {
        return last.values.clone();
    }

    // Bracketing pair around `progress`.
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
    let local = (progress - lo.offset) / span;
    let easing = hi.easing.or(lo.easing).or(block_easing).unwrap_or_default();
    let k = easing.eval(local);

    let names: BTreeSet<&String> = lo.values.keys().chain(hi.values.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let a = lo.values.get(name).copied().unwrap_or(0.0);
            let b = hi.values.get(name).copied().unwrap_or(0.0);
            (name.clone(), a + (b - a) * k)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::EngineEvent;
    use crate::stage::{HeadCall, NullEffects, RecordingHead};
    use crate::timeline::EmojiData;

    fn ctx<'a>(
        head: &'a mut RecordingHead,
        effects: &'a mut NullEffects,
        outbox: &'a mut Vec<EngineEvent>,
    ) -> StageContext<'a> {
        StageContext {
            head,
            effects,
            outbox,
        }
    }

    fn morph_block(id: &str, start: u64, dur: u64, name: &str, value: f32, intensity: f32) -> Block {
        let mut data = BlendshapeData {
            intensity,
            ..Default::default()
        };
        data.target_morphs.insert(name.to_string(), value);
        Block::new(id, start, dur, LayerData::Blendshape(data))
    }

    #[test]
    fn blends_by_weighted_mean() {
        let mut exec = BlendshapeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();

        let a = morph_block("a", 0, 1000, "smile", 1.0, 1.0);
        let b = morph_block("b", 0, 1000, "smile", 0.0, 3.0);
        exec.update(
            500.0,
            16.0,
            &[&a, &b],
            &mut ctx(&mut head, &mut fxs, &mut outbox),
        );

        // (1.0*1 + 0.0*3) / 4 = 0.25
        match &head.calls[0] {
            HeadCall::SetValue(name, v) => {
                assert_eq!(name, "smile");
                assert!((v - 0.25).abs() < 1e-6);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn mood_fires_once_per_change() {
        let mut exec = BlendshapeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();

        let mut block = morph_block("m", 0, 1000, "x", 1.0, 1.0);
        if let LayerData::Blendshape(data) = &mut block.data {
            data.mood = Some(Mood::Happy);
        }
        let mut c = ctx(&mut head, &mut fxs, &mut outbox);
        exec.update(100.0, 16.0, &[&block], &mut c);
        exec.update(200.0, 16.0, &[&block], &mut c);
        drop(c);

        let moods = head.calls_named(|c| matches!(c, HeadCall::SetMood(_)));
        assert_eq!(moods.len(), 1);
    }

    #[test]
    fn one_shot_emoji_fires_near_start_only() {
        let mut exec = BlendshapeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();

        let mut block = morph_block("e", 0, 1000, "x", 1.0, 1.0);
        if let LayerData::Blendshape(data) = &mut block.data {
            data.emoji = Some("🎤".to_string());
        }
        let mut c = ctx(&mut head, &mut fxs, &mut outbox);
        exec.update(10.0, 16.0, &[&block], &mut c);
        exec.update(20.0, 16.0, &[&block], &mut c);
        exec.update(900.0, 16.0, &[&block], &mut c);
        drop(c);

        let emojis = head.calls_named(|c| matches!(c, HeadCall::SpeakEmoji(_)));
        assert_eq!(emojis.len(), 1);
    }

    #[test]
    fn keyframes_interpolate_linearly() {
        let mut kf_a = MorphKeyframe {
            offset: 0.0,
            values: BTreeMap::new(),
            easing: None,
        };
        kf_a.values.insert("jaw".to_string(), 0.0);
        let mut kf_b = MorphKeyframe {
            offset: 1.0,
            values: BTreeMap::new(),
            easing: None,
        };
        kf_b.values.insert("jaw".to_string(), 1.0);

        let out = interpolate_keyframes(&[kf_a, kf_b], None, 0.25);
        assert!((out["jaw"] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn stop_resets_touched_morphs_and_mood() {
        let mut exec = BlendshapeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();

        let block = morph_block("a", 0, 1000, "smile", 1.0, 1.0);
        let mut c = ctx(&mut head, &mut fxs, &mut outbox);
        exec.update(500.0, 16.0, &[&block], &mut c);
        exec.stop(&mut c);
        drop(c);

        assert!(head
            .calls
            .contains(&HeadCall::SetValue("smile".to_string(), 0.0)));
        assert_eq!(*head.calls.last().unwrap(), HeadCall::SetMood(Mood::Neutral));
    }

    #[test]
    fn ignores_foreign_block_data() {
        let mut exec = BlendshapeExecutor::new();
        let mut head = RecordingHead::new();
        let mut fxs = NullEffects;
        let mut outbox = Vec::new();

        let block = Block::new(
            "x",
            0,
            1000,
            LayerData::Emoji(EmojiData {
                emoji: "😊".to_string(),
            }),
        );
        exec.update(
            0.0,
            16.0,
            &[&block],
            &mut ctx(&mut head, &mut fxs, &mut outbox),
        );
        assert!(head.calls.is_empty());
    }
}
