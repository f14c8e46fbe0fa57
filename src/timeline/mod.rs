// SERENADE Timeline - the compiled, flat, typed form of a plan
// Copyright (c) 2026 SERENADE Project
//
// A timeline is seven named layers plus a flat bag of typed, time-bounded
// blocks. Blocks are data only; the engine selects them per tick and the
// executors interpret them. Nothing in here mutates the rig.

pub mod compile;
pub mod easing;

pub use compile::{compile, CompileOptions, CompiledShow};
pub use easing::Easing;

use crate::director::plan::FxKind;
use crate::stage::{CameraView, LightPreset, Mood};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The seven fixed tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerId {
    Viseme,
    Dance,
    Blendshape,
    Emoji,
    Lighting,
    Camera,
    Fx,
}

impl LayerId {
    pub const ALL: [LayerId; 7] = [
        LayerId::Viseme,
        LayerId::Dance,
        LayerId::Blendshape,
        LayerId::Emoji,
        LayerId::Lighting,
        LayerId::Camera,
        LayerId::Fx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerId::Viseme => "viseme",
            LayerId::Dance => "dance",
            LayerId::Blendshape => "blendshape",
            LayerId::Emoji => "emoji",
            LayerId::Lighting => "lighting",
            LayerId::Camera => "camera",
            LayerId::Fx => "fx",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "viseme" => Some(LayerId::Viseme),
            "dance" => Some(LayerId::Dance),
            "blendshape" => Some(LayerId::Blendshape),
            "emoji" => Some(LayerId::Emoji),
            "lighting" => Some(LayerId::Lighting),
            "camera" => Some(LayerId::Camera),
            "fx" => Some(LayerId::Fx),
            _ => None,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How simultaneous blocks on one layer combine. Executors that take a
/// single winner use `Override`; stacking executors use `Additive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Override,
    Additive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub enabled: bool,
    pub muted: bool,
    /// Distinct per layer so conflicts always have a deterministic winner.
    pub priority: u8,
    pub blend_mode: BlendMode,
}

/// The canonical seven-layer set, priorities distinct by construction.
pub fn default_layers() -> Vec<Layer> {
    let table = [
        (LayerId::Viseme, 70, BlendMode::Override),
        (LayerId::Dance, 60, BlendMode::Override),
        (LayerId::Blendshape, 50, BlendMode::Additive),
        (LayerId::Emoji, 40, BlendMode::Override),
        (LayerId::Lighting, 30, BlendMode::Override),
        (LayerId::Camera, 20, BlendMode::Override),
        (LayerId::Fx, 10, BlendMode::Additive),
    ];
    table
        .into_iter()
        .map(|(id, priority, blend_mode)| Layer {
            id,
            enabled: true,
            muted: false,
            priority,
            blend_mode,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEdge {
    Start,
    End,
}

/// A cross-layer dispatch fired when a block starts or ends. Routed by the
/// engine to the target layer's executor; blocks never call each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub edge: TriggerEdge,
    pub target: LayerId,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphKeyframe {
    /// Position inside the block, 0..=1.
    pub offset: f32,
    pub values: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easing: Option<Easing>,
}

fn default_intensity() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendshapeData {
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default)]
    pub target_morphs: BTreeMap<String, f32>,
    #[serde(default)]
    pub keyframes: Vec<MorphKeyframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    /// One-shot emoji fired near block start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Default for BlendshapeData {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            target_morphs: BTreeMap::new(),
            keyframes: Vec::new(),
            mood: None,
            emoji: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiData {
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightTransition {
    #[default]
    Fade,
    Pulse,
    Cut,
}

impl LightTransition {
    /// Fade duration the transition implies.
    pub fn fade_ms(&self) -> f64 {
        match self {
            LightTransition::Fade => 500.0,
            LightTransition::Pulse => 300.0,
            LightTransition::Cut => 0.0,
        }
    }
}

/// One light's target: hex color + intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSpec {
    pub color: String,
    pub intensity: f32,
}

impl LightSpec {
    pub fn new(color: &str, intensity: f32) -> Self {
        Self {
            color: color.to_string(),
            intensity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightLevels {
    pub ambient: LightSpec,
    pub direct: LightSpec,
    pub spot: LightSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingData {
    pub preset: LightPreset,
    #[serde(default)]
    pub transition: LightTransition,
    #[serde(default)]
    pub audio_pulse: bool,
    /// Custom levels override the preset when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<LightLevels>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraMovement {
    #[default]
    Static,
    Dolly,
    Pan,
    Tilt,
    Orbit,
    Punch,
    Sweep,
    Shake,
}

impl CameraMovement {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "static" => Some(CameraMovement::Static),
            "dolly" => Some(CameraMovement::Dolly),
            "pan" => Some(CameraMovement::Pan),
            "tilt" => Some(CameraMovement::Tilt),
            "orbit" => Some(CameraMovement::Orbit),
            "punch" => Some(CameraMovement::Punch),
            "sweep" => Some(CameraMovement::Sweep),
            "shake" => Some(CameraMovement::Shake),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CameraData {
    #[serde(default)]
    pub view: CameraView,
    #[serde(default)]
    pub movement: CameraMovement,
    /// Movement amounts; which ones apply depends on `movement`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbit: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_angle: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_angle: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f32>,
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanceData {
    pub clip_url: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

/// A post-effect parameter. Numbers interpolate; flags snap to the next
/// keyframe's value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FxValue {
    Flag(bool),
    Number(f64),
}

impl FxValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FxValue::Number(n) => Some(*n),
            FxValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FxValue::Flag(b) => Some(*b),
            FxValue::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxKeyframe {
    pub offset: f32,
    pub params: BTreeMap<String, FxValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easing: Option<Easing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxData {
    pub effect: FxKind,
    #[serde(default)]
    pub params: BTreeMap<String, FxValue>,
    #[serde(default)]
    pub keyframes: Vec<FxKeyframe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VisemeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub wtimes: Vec<u64>,
    #[serde(default)]
    pub wdurations: Vec<u64>,
    #[serde(default)]
    pub visemes: Vec<String>,
    #[serde(default)]
    pub vtimes: Vec<u64>,
    #[serde(default)]
    pub vdurations: Vec<u64>,
}

/// Per-layer payload, selected by the block's layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerData {
    Viseme(VisemeData),
    Dance(DanceData),
    Blendshape(BlendshapeData),
    Emoji(EmojiData),
    Lighting(LightingData),
    Camera(CameraData),
    Fx(FxData),
}

impl LayerData {
    pub fn layer(&self) -> LayerId {
        match self {
            LayerData::Viseme(_) => LayerId::Viseme,
            LayerData::Dance(_) => LayerId::Dance,
            LayerData::Blendshape(_) => LayerId::Blendshape,
            LayerData::Emoji(_) => LayerId::Emoji,
            LayerData::Lighting(_) => LayerId::Lighting,
            LayerData::Camera(_) => LayerId::Camera,
            LayerData::Fx(_) => LayerId::Fx,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub layer: LayerId,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub data: LayerData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ease_in: Option<Easing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ease_out: Option<Easing>,
    #[serde(default)]
    pub fade_in_ms: u64,
    #[serde(default)]
    pub fade_out_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_events: Vec<TriggerEvent>,
}

impl Block {
    pub fn new(id: &str, start_ms: u64, duration_ms: u64, data: LayerData) -> Self {
        Self {
            id: id.to_string(),
            layer: data.layer(),
            start_ms,
            duration_ms,
            data,
            ease_in: None,
            ease_out: None,
            fade_in_ms: 0,
            fade_out_ms: 0,
            label: None,
            trigger_events: Vec::new(),
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }

    /// Half-open window test: `start <= t < start + duration`.
    pub fn is_active_at(&self, t_ms: f64) -> bool {
        self.start_ms as f64 <= t_ms && t_ms < self.end_ms() as f64
    }

    /// Position inside the block, clamped to `[0, 1]`.
    pub fn progress_at(&self, t_ms: f64) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (((t_ms - self.start_ms as f64) / self.duration_ms as f64) as f32).clamp(0.0, 1.0)
    }

    /// Combined fade-in/fade-out envelope at `t`, 1.0 when no fades are set.
    pub fn fade_factor(&self, t_ms: f64) -> f32 {
        let mut factor = 1.0f32;
        if self.fade_in_ms > 0 {
            let f = (t_ms - self.start_ms as f64) / self.fade_in_ms as f64;
            factor = factor.min((f as f32).clamp(0.0, 1.0));
        }
        if self.fade_out_ms > 0 {
            let f = (self.end_ms() as f64 - t_ms) / self.fade_out_ms as f64;
            factor = factor.min((f as f32).clamp(0.0, 1.0));
        }
        factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time_ms: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub layers: Vec<Layer>,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl Timeline {
    pub fn new(id: &str, name: &str, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            duration_ms,
            layers: default_layers(),
            blocks: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn blocks_on(&self, id: LayerId) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.layer == id)
    }

    /// Latest block end; the timeline duration must cover this.
    pub fn max_block_end_ms(&self) -> u64 {
        self.blocks.iter().map(Block::end_ms).max().unwrap_or(0)
    }
}
