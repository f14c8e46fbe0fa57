// SERENADE Compiler - lower a semantic plan onto the seven tracks
// Copyright (c) 2026 SERENADE Project
//
// Pure lowering: sections become defaulting blocks spanning their window,
// actions become typed blocks or cross-layer trigger pulses, and verbs with
// no timeline meaning are handed back to the caller untouched. The compiler
// is total over the verb catalog; unknown verbs are logged, never fatal.

use crate::director::plan::{FxKind, Plan, PlanAction, PlanSection};
use crate::stage::{CameraView, LightPreset, Mood};
use crate::timeline::{
    Block, BlendshapeData, CameraData, CameraMovement, DanceData, EmojiData, FxData, FxValue,
    LayerData, LayerId, LightTransition, LightingData, Marker, Timeline, TriggerEdge,
    TriggerEvent, VisemeData,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::{debug, warn};

const MOOD_BLOCK_MS: u64 = 2_000;
const EXPRESSION_BLOCK_MS: u64 = 1_200;
const FX_BLOCK_MS: u64 = 2_000;
const CAMERA_MOVE_MS: u64 = 1_200;
const DANCE_BLOCK_MS: u64 = 2_500;
const TRIGGER_PULSE_MS: u64 = 160;
const EMOJI_BLOCK_MS: u64 = 1_200;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub default_light: LightPreset,
    pub default_camera: CameraView,
    pub default_mood: Mood,
    /// Lip-sync payload; when present a single viseme block spans the song.
    pub speech: Option<VisemeData>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_light: LightPreset::Spotlight,
            default_camera: CameraView::Full,
            default_mood: Mood::Neutral,
            speech: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledShow {
    pub timeline: Timeline,
    /// Session verbs the timeline cannot express; the caller owns these.
    pub external_actions: Vec<PlanAction>,
}

/// Compile a merged plan into a playable timeline.
///
/// Deterministic: the same plan compiles to the same block sequence (ids
/// included), so re-compiling is cheap and diffable.
pub fn compile(plan: &Plan, opts: &CompileOptions) -> CompiledShow {
    let mut cc = Compiler {
        duration_ms: plan.duration_ms,
        opts,
        blocks: Vec::new(),
        markers: Vec::new(),
        external: Vec::new(),
        counters: HashMap::new(),
    };

    for section in &plan.sections {
        cc.lower_section(section);
    }
    for action in &plan.actions {
        cc.lower_action(action, 0, plan.duration_ms);
    }
    if let Some(speech) = &opts.speech {
        cc.push_block(
            0,
            plan.duration_ms,
            LayerData::Viseme(speech.clone()),
            Some("lip sync"),
        );
    }

    cc.blocks.sort_by_key(|b| b.start_ms);

    let mut timeline = Timeline::new(
        "show-1",
        if plan.title.is_empty() {
            "untitled show"
        } else {
            &plan.title
        },
        plan.duration_ms,
    );
    timeline.blocks = cc.blocks;
    timeline.markers = cc.markers;

    debug!(
        "[COMPILE] {} sections -> {} blocks, {} external actions",
        plan.sections.len(),
        timeline.blocks.len(),
        cc.external.len()
    );

    CompiledShow {
        timeline,
        external_actions: cc.external,
    }
}

struct Compiler<'a> {
    duration_ms: u64,
    opts: &'a CompileOptions,
    blocks: Vec<Block>,
    markers: Vec<Marker>,
    external: Vec<PlanAction>,
    counters: HashMap<LayerId, u32>,
}

impl Compiler<'_> {
    fn next_id(&mut self, layer: LayerId) -> String {
        let n = self.counters.entry(layer).or_insert(0);
        *n += 1;
        format!("{}-{:03}", layer, n)
    }

    fn push_block(
        &mut self,
        start_ms: u64,
        duration_ms: u64,
        data: LayerData,
        label: Option<&str>,
    ) -> &mut Block {
        let start_ms = start_ms.min(self.duration_ms.saturating_sub(1));
        let duration_ms = duration_ms.max(1).min(self.duration_ms - start_ms);
        let id = self.next_id(data.layer());
        let mut block = Block::new(&id, start_ms, duration_ms, data);
        block.label = label.map(str::to_string);
        self.blocks.push(block);
        self.blocks.last_mut().unwrap()
    }

    fn lower_section(&mut self, section: &PlanSection) {
        self.markers.push(Marker {
            time_ms: section.start_ms,
            label: section.label.clone(),
        });

        let window = section.duration_ms();

        if let Some(mood) = section.mood {
            let block = self.push_block(
                section.start_ms,
                window,
                LayerData::Blendshape(BlendshapeData {
                    mood: Some(mood),
                    ..Default::default()
                }),
                Some(&section.label),
            );
            block.fade_in_ms = 250;
            block.fade_out_ms = 250;
        }

        self.push_block(
            section.start_ms,
            window,
            LayerData::Camera(CameraData {
                view: section.camera.unwrap_or(self.opts.default_camera),
                movement: CameraMovement::Static,
                ..Default::default()
            }),
            Some(&section.label),
        );

        self.push_block(
            section.start_ms,
            window,
            LayerData::Lighting(LightingData {
                preset: section.light.unwrap_or(self.opts.default_light),
                transition: LightTransition::Fade,
                audio_pulse: false,
                overrides: None,
            }),
            Some(&section.label),
        );

        if let Some(fx) = section.fx {
            self.push_block(
                section.start_ms,
                window,
                LayerData::Fx(FxData {
                    effect: fx,
                    params: default_fx_params(fx),
                    keyframes: Vec::new(),
                }),
                Some(&section.label),
            );
        }

        for action in &section.actions {
            self.lower_action(action, section.start_ms, section.end_ms);
        }
    }

    fn lower_action(&mut self, action: &PlanAction, window_start: u64, window_end: u64) {
        let t = action.time_ms.clamp(window_start, window_end);
        let args = &action.args;

        match action.action.as_str() {
            "set_mood" => {
                let dur = arg_duration_ms(args).unwrap_or(MOOD_BLOCK_MS);
                self.push_block(
                    t,
                    dur,
                    LayerData::Blendshape(BlendshapeData {
                        mood: args
                            .get("mood")
                            .and_then(Value::as_str)
                            .and_then(Mood::parse)
                            .or(Some(self.opts.default_mood)),
                        ..Default::default()
                    }),
                    Some("set_mood"),
                );
            }
            "make_facial_expression" => {
                let dur = arg_duration_ms(args).unwrap_or(EXPRESSION_BLOCK_MS);
                let block = self.push_block(
                    t,
                    dur,
                    LayerData::Blendshape(BlendshapeData {
                        target_morphs: expression_morphs(args),
                        intensity: arg_f32(args, "intensity").unwrap_or(1.0),
                        ..Default::default()
                    }),
                    Some("expression"),
                );
                block.fade_in_ms = 150;
                block.fade_out_ms = 150;
            }
            "speak_emoji" => {
                let glyph = args
                    .get("emoji")
                    .and_then(Value::as_str)
                    .unwrap_or("😐")
                    .to_string();
                self.push_block(
                    t,
                    EMOJI_BLOCK_MS,
                    LayerData::Emoji(EmojiData { emoji: glyph }),
                    Some("emoji"),
                );
            }
            "set_light_preset" => {
                let preset = args
                    .get("preset")
                    .and_then(Value::as_str)
                    .and_then(LightPreset::parse)
                    .unwrap_or(self.opts.default_light);
                // Holds until the section hands lighting back.
                let dur = arg_duration_ms(args).unwrap_or_else(|| (window_end - t).max(500));
                self.push_block(
                    t,
                    dur,
                    LayerData::Lighting(LightingData {
                        preset,
                        transition: LightTransition::Fade,
                        audio_pulse: args
                            .get("audio_pulse")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        overrides: None,
                    }),
                    Some("light change"),
                );
            }
            "set_view" => {
                let dur = arg_duration_ms(args).unwrap_or(CAMERA_MOVE_MS);
                self.push_block(
                    t,
                    dur,
                    LayerData::Camera(CameraData {
                        view: args
                            .get("view")
                            .and_then(Value::as_str)
                            .and_then(CameraView::parse)
                            .unwrap_or(self.opts.default_camera),
                        movement: CameraMovement::Static,
                        ..Default::default()
                    }),
                    Some("set_view"),
                );
            }
            "camera_dolly" | "camera_pan" | "camera_tilt" | "camera_orbit" | "camera_punch"
            | "camera_sweep" | "camera_shake" => {
                self.lower_camera_move(&action.action, args, t);
            }
            "post_bloom" | "post_vignette" | "post_chromatic" | "post_glitch"
            | "post_pixelation" => {
                let effect = match action.action.as_str() {
                    "post_bloom" => FxKind::Bloom,
                    "post_vignette" => FxKind::Vignette,
                    "post_chromatic" => FxKind::Chromatic,
                    "post_glitch" => FxKind::Glitch,
                    _ => FxKind::Pixelation,
                };
                let dur = arg_duration_ms(args).unwrap_or(FX_BLOCK_MS);
                let mut params = default_fx_params(effect);
                merge_fx_args(&mut params, args);
                let block = self.push_block(
                    t,
                    dur,
                    LayerData::Fx(FxData {
                        effect,
                        params,
                        keyframes: Vec::new(),
                    }),
                    Some(&action.action),
                );
                block.fade_in_ms = 200;
                block.fade_out_ms = 300;
            }
            "play_animation" => {
                // A named clip is timeline-meaningful; it gets a dance block.
                let url = args
                    .get("url")
                    .or_else(|| args.get("clip"))
                    .and_then(Value::as_str);
                if let Some(url) = url {
                    let dur = arg_duration_ms(args).unwrap_or(DANCE_BLOCK_MS);
                    self.push_block(
                        t,
                        dur,
                        LayerData::Dance(DanceData {
                            clip_url: url.to_string(),
                            speed: arg_f32(args, "speed").unwrap_or(1.0),
                        }),
                        Some("dance"),
                    );
                } else {
                    self.push_trigger(t, LayerId::Dance, &action.action, args.clone());
                }
            }
            "play_gesture" | "stop_gesture" | "play_pose" | "stop_pose" | "stop_animation" => {
                self.push_trigger(t, LayerId::Dance, &action.action, args.clone());
            }
            "look_at" | "look_at_camera" | "make_eye_contact" => {
                self.push_trigger(t, LayerId::Camera, &action.action, args.clone());
            }
            "set_value" => {
                self.push_trigger(t, LayerId::Blendshape, &action.action, args.clone());
            }
            "speak_break" | "speak_marker" => {
                self.push_trigger(t, LayerId::Viseme, &action.action, args.clone());
            }
            "post_reset" => {
                self.push_trigger(t, LayerId::Fx, &action.action, args.clone());
            }
            // Session and environment verbs have no timeline semantics.
            "start" | "stop" | "start_listening" | "stop_listening" | "speak_to"
            | "set_speaker_target" | "get_value" | "set_environment" | "set_background"
            | "play_background_audio" | "stop_background_audio" => {
                self.external.push(PlanAction {
                    time_ms: t,
                    action: action.action.clone(),
                    args: args.clone(),
                });
            }
            other => {
                warn!("[COMPILE] unknown verb '{}' passed through", other);
                self.external.push(PlanAction {
                    time_ms: t,
                    action: other.to_string(),
                    args: args.clone(),
                });
            }
        }
    }

    fn lower_camera_move(&mut self, verb: &str, args: &Value, t: u64) {
        let dur = arg_duration_ms(args).unwrap_or(CAMERA_MOVE_MS);
        let movement = match verb {
            "camera_dolly" => CameraMovement::Dolly,
            "camera_pan" => CameraMovement::Pan,
            "camera_tilt" => CameraMovement::Tilt,
            "camera_orbit" => CameraMovement::Orbit,
            "camera_punch" => CameraMovement::Punch,
            "camera_sweep" => CameraMovement::Sweep,
            _ => CameraMovement::Shake,
        };
        self.push_block(
            t,
            dur,
            LayerData::Camera(CameraData {
                view: args
                    .get("view")
                    .and_then(Value::as_str)
                    .and_then(CameraView::parse)
                    .unwrap_or(self.opts.default_camera),
                movement,
                distance: arg_f32(args, "distance"),
                rotate_x: arg_f32(args, "rotate_x").or_else(|| arg_f32(args, "degrees")),
                rotate_y: arg_f32(args, "rotate_y").or_else(|| arg_f32(args, "degrees")),
                orbit: arg_f32(args, "orbit").or_else(|| arg_f32(args, "degrees")),
                punch: arg_f32(args, "punch").or_else(|| arg_f32(args, "amount")),
                start_angle: arg_f32(args, "start_angle"),
                end_angle: arg_f32(args, "end_angle"),
                intensity: arg_f32(args, "intensity"),
                frequency: arg_f32(args, "frequency"),
            }),
            Some(verb),
        );
    }

    /// A tiny blendshape block whose only job is to carry a start-edge
    /// trigger to another layer's executor.
    fn push_trigger(&mut self, t: u64, target: LayerId, action: &str, args: Value) {
        let block = self.push_block(
            t,
            TRIGGER_PULSE_MS,
            LayerData::Blendshape(BlendshapeData {
                intensity: 0.0,
                ..Default::default()
            }),
            Some(action),
        );
        block.trigger_events.push(TriggerEvent {
            edge: TriggerEdge::Start,
            target,
            action: action.to_string(),
            args,
            delay_ms: 0,
        });
    }
}

/// Explicit durations in args beat the per-verb defaults. `duration_ms`,
/// `t` and `ms` are milliseconds; `duration` is seconds.
fn arg_duration_ms(args: &Value) -> Option<u64> {
    for key in ["duration_ms", "t", "ms"] {
        if let Some(n) = args.get(key).and_then(Value::as_f64) {
            if n > 0.0 {
                return Some(n as u64);
            }
        }
    }
    if let Some(secs) = args.get("duration").and_then(Value::as_f64) {
        if secs > 0.0 {
            return Some((secs * 1000.0) as u64);
        }
    }
    None
}

fn arg_f32(args: &Value, key: &str) -> Option<f32> {
    args.get(key).and_then(Value::as_f64).map(|n| n as f32)
}

fn expression_morphs(args: &Value) -> BTreeMap<String, f32> {
    let mut morphs = BTreeMap::new();
    if let Some(map) = args.get("morphs").and_then(Value::as_object) {
        for (name, v) in map {
            if let Some(n) = v.as_f64() {
                morphs.insert(name.clone(), n as f32);
            }
        }
    } else if let Some(name) = args.get("name").and_then(Value::as_str) {
        morphs.insert(
            name.to_string(),
            arg_f32(args, "value").unwrap_or(1.0),
        );
    }
    morphs
}

pub fn default_fx_params(effect: FxKind) -> BTreeMap<String, FxValue> {
    let mut params = BTreeMap::new();
    match effect {
        FxKind::Bloom => {
            params.insert("strength".to_string(), FxValue::Number(1.5));
            params.insert("radius".to_string(), FxValue::Number(0.4));
            params.insert("threshold".to_string(), FxValue::Number(0.85));
        }
        FxKind::Vignette => {
            params.insert("darkness".to_string(), FxValue::Number(1.1));
            params.insert("offset".to_string(), FxValue::Number(1.0));
        }
        FxKind::Chromatic => {
            params.insert("offset".to_string(), FxValue::Number(0.002));
        }
        FxKind::Glitch => {
            params.insert("intensity".to_string(), FxValue::Number(0.3));
            params.insert("wild".to_string(), FxValue::Flag(false));
        }
        FxKind::Pixelation => {
            params.insert("size".to_string(), FxValue::Number(6.0));
        }
    }
    params
}

fn merge_fx_args(params: &mut BTreeMap<String, FxValue>, args: &Value) {
    if let Some(map) = args.as_object() {
        for (key, v) in map {
            if key == "duration" || key == "duration_ms" || key == "t" || key == "ms" {
                continue;
            }
            if let Some(n) = v.as_f64() {
                params.insert(key.clone(), FxValue::Number(n));
            } else if let Some(b) = v.as_bool() {
                params.insert(key.clone(), FxValue::Flag(b));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::plan::Role;
    use serde_json::json;

    fn section(start: u64, end: u64) -> PlanSection {
        PlanSection {
            label: format!("s{}", start),
            start_ms: start,
            end_ms: end,
            role: Role::Solo,
            mood: Some(Mood::Happy),
            camera: Some(CameraView::Mid),
            light: Some(LightPreset::Neon),
            fx: None,
            notes: None,
            actions: Vec::new(),
        }
    }

    fn plan_with(sections: Vec<PlanSection>, duration_ms: u64) -> Plan {
        Plan {
            title: "t".to_string(),
            duration_ms,
            sections,
            actions: Vec::new(),
        }
    }

    #[test]
    fn every_block_stays_inside_the_song() {
        let mut s = section(0, 8000);
        s.actions.push(PlanAction {
            time_ms: 7800,
            action: "set_mood".to_string(),
            args: json!({"mood": "sad"}),
        });
        let plan = plan_with(vec![s], 8000);
        let show = compile(&plan, &CompileOptions::default());
        for block in &show.timeline.blocks {
            assert!(block.end_ms() <= 8000, "block {} leaks", block.id);
        }
    }

    #[test]
    fn sections_emit_defaulting_blocks() {
        let plan = plan_with(vec![section(0, 5000)], 5000);
        let show = compile(&plan, &CompileOptions::default());
        let layers: Vec<LayerId> = show.timeline.blocks.iter().map(|b| b.layer).collect();
        assert!(layers.contains(&LayerId::Blendshape));
        assert!(layers.contains(&LayerId::Camera));
        assert!(layers.contains(&LayerId::Lighting));
        assert_eq!(show.timeline.markers.len(), 1);
    }

    #[test]
    fn cross_layer_verbs_become_trigger_pulses() {
        let mut s = section(0, 4000);
        s.actions.push(PlanAction {
            time_ms: 1000,
            action: "play_gesture".to_string(),
            args: json!({"name": "wave"}),
        });
        let plan = plan_with(vec![s], 4000);
        let show = compile(&plan, &CompileOptions::default());
        let pulse = show
            .timeline
            .blocks
            .iter()
            .find(|b| !b.trigger_events.is_empty())
            .expect("trigger pulse emitted");
        assert_eq!(pulse.layer, LayerId::Blendshape);
        assert_eq!(pulse.duration_ms, TRIGGER_PULSE_MS);
        assert_eq!(pulse.trigger_events[0].target, LayerId::Dance);
        assert_eq!(pulse.trigger_events[0].action, "play_gesture");
    }

    #[test]
    fn session_verbs_pass_through_untranslated() {
        let mut s = section(0, 4000);
        s.actions.push(PlanAction {
            time_ms: 0,
            action: "play_background_audio".to_string(),
            args: json!({"url": "amb.mp3"}),
        });
        s.actions.push(PlanAction {
            time_ms: 10,
            action: "totally_new_verb".to_string(),
            args: Value::Null,
        });
        let plan = plan_with(vec![s], 4000);
        let show = compile(&plan, &CompileOptions::default());
        let verbs: Vec<&str> = show
            .external_actions
            .iter()
            .map(|a| a.action.as_str())
            .collect();
        assert_eq!(verbs, vec!["play_background_audio", "totally_new_verb"]);
    }

    #[test]
    fn explicit_durations_override_defaults_and_clamp() {
        let mut s = section(0, 4000);
        s.actions.push(PlanAction {
            time_ms: 3000,
            action: "post_glitch".to_string(),
            args: json!({"duration": 9.0, "intensity": 0.8}),
        });
        let plan = plan_with(vec![s], 4000);
        let show = compile(&plan, &CompileOptions::default());
        let fx = show
            .timeline
            .blocks
            .iter()
            .find(|b| b.layer == LayerId::Fx)
            .unwrap();
        assert_eq!(fx.start_ms, 3000);
        assert_eq!(fx.end_ms(), 4000);
        match &fx.data {
            LayerData::Fx(data) => {
                assert_eq!(data.params["intensity"], FxValue::Number(0.8));
            }
            other => panic!("wrong data: {:?}", other),
        }
    }

    #[test]
    fn speech_track_becomes_one_spanning_viseme_block() {
        let plan = plan_with(vec![section(0, 3000)], 3000);
        let opts = CompileOptions {
            speech: Some(VisemeData {
                audio_url: Some("song.mp3".to_string()),
                words: vec!["la".to_string()],
                wtimes: vec![0],
                wdurations: vec![300],
                ..Default::default()
            }),
            ..Default::default()
        };
        let show = compile(&plan, &opts);
        let visemes: Vec<&Block> = show
            .timeline
            .blocks
            .iter()
            .filter(|b| b.layer == LayerId::Viseme)
            .collect();
        assert_eq!(visemes.len(), 1);
        assert_eq!(visemes[0].start_ms, 0);
        assert_eq!(visemes[0].end_ms(), 3000);
    }

    #[test]
    fn compile_is_idempotent_modulo_nothing() {
        let mut s = section(0, 6000);
        s.actions.push(PlanAction {
            time_ms: 2000,
            action: "camera_orbit".to_string(),
            args: json!({"degrees": 30}),
        });
        let plan = plan_with(vec![s, section(6000, 9000)], 9000);
        let a = compile(&plan, &CompileOptions::default());
        let b = compile(&plan, &CompileOptions::default());
        let shape = |show: &CompiledShow| {
            show.timeline
                .blocks
                .iter()
                .map(|b| (b.layer, b.start_ms, b.duration_ms, b.label.clone(), b.id.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&a), shape(&b));
    }

    #[test]
    fn blocks_are_sorted_by_start() {
        let mut s1 = section(0, 3000);
        s1.actions.push(PlanAction {
            time_ms: 2500,
            action: "set_mood".to_string(),
            args: json!({"mood": "angry"}),
        });
        let plan = plan_with(vec![s1, section(3000, 6000)], 6000);
        let show = compile(&plan, &CompileOptions::default());
        let starts: Vec<u64> = show.timeline.blocks.iter().map(|b| b.start_ms).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }
}
