// SERENADE Head Surface - imperative operations on the external 3D rig
// Copyright (c) 2026 SERENADE Project
//
// The renderer and avatar rig live outside this crate. The kernel only ever
// talks to them through the `Head` trait below; executors mutate the rig,
// nothing in here renders anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Facial mood of the avatar. Closed vocabulary shared with the directors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Love,
    Fear,
    Sad,
    Angry,
    Disgust,
    Sleep,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Love,
        Mood::Fear,
        Mood::Sad,
        Mood::Angry,
        Mood::Disgust,
        Mood::Sleep,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neutral" => Some(Mood::Neutral),
            "happy" => Some(Mood::Happy),
            "love" => Some(Mood::Love),
            "fear" => Some(Mood::Fear),
            "sad" => Some(Mood::Sad),
            "angry" => Some(Mood::Angry),
            "disgust" => Some(Mood::Disgust),
            "sleep" => Some(Mood::Sleep),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Love => "love",
            Mood::Fear => "fear",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Disgust => "disgust",
            Mood::Sleep => "sleep",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera framing of the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraView {
    #[default]
    Full,
    Mid,
    Upper,
    Head,
}

impl CameraView {
    pub const ALL: [CameraView; 4] = [
        CameraView::Full,
        CameraView::Mid,
        CameraView::Upper,
        CameraView::Head,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full" => Some(CameraView::Full),
            "mid" => Some(CameraView::Mid),
            "upper" => Some(CameraView::Upper),
            "head" => Some(CameraView::Head),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraView::Full => "full",
            CameraView::Mid => "mid",
            CameraView::Upper => "upper",
            CameraView::Head => "head",
        }
    }
}

impl fmt::Display for CameraView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage lighting preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightPreset {
    #[default]
    Spotlight,
    Neon,
    Noir,
    Sunset,
    Frost,
    Crimson,
}

impl LightPreset {
    /// Presets the directors may pick from; spotlight is the implicit default.
    pub const DIRECTABLE: [LightPreset; 5] = [
        LightPreset::Neon,
        LightPreset::Noir,
        LightPreset::Sunset,
        LightPreset::Frost,
        LightPreset::Crimson,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spotlight" => Some(LightPreset::Spotlight),
            "neon" => Some(LightPreset::Neon),
            "noir" => Some(LightPreset::Noir),
            "sunset" => Some(LightPreset::Sunset),
            "frost" => Some(LightPreset::Frost),
            "crimson" => Some(LightPreset::Crimson),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LightPreset::Spotlight => "spotlight",
            LightPreset::Neon => "neon",
            LightPreset::Noir => "noir",
            LightPreset::Sunset => "sunset",
            LightPreset::Frost => "frost",
            LightPreset::Crimson => "crimson",
        }
    }
}

impl fmt::Display for LightPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rig's orbit-camera tuple. Executors write these fields directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraRig {
    pub distance: f32,
    pub x: f32,
    pub y: f32,
    pub rotate_x: f32,
    pub rotate_y: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            distance: 1.2,
            x: 0.0,
            y: 0.0,
            rotate_x: 0.0,
            rotate_y: 0.0,
        }
    }
}

/// One scene light handle: hex color plus intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightRig {
    pub color: String,
    pub intensity: f32,
}

impl LightRig {
    pub fn new(color: &str, intensity: f32) -> Self {
        Self {
            color: color.to_string(),
            intensity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSlot {
    Ambient,
    Direct,
    Spot,
}

/// Everything `speak_audio` needs for lip-synced playback: the audio source
/// plus parallel word and viseme tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechCue {
    pub audio_url: String,
    pub words: Vec<String>,
    pub wtimes: Vec<u64>,
    pub wdurations: Vec<u64>,
    pub visemes: Vec<String>,
    pub vtimes: Vec<u64>,
    pub vdurations: Vec<u64>,
}

/// Capability surface of the external talking-head rig.
///
/// Single-threaded by contract: only executors call these, only on the
/// engine tick.
pub trait Head {
    fn set_mood(&mut self, mood: Mood);
    fn set_value(&mut self, name: &str, value: f32);
    fn set_view(&mut self, view: CameraView, t_ms: u64);
    fn speak(&mut self, text: &str);
    fn speak_audio(&mut self, cue: SpeechCue);
    fn speak_emoji(&mut self, emoji: &str);
    fn speak_break(&mut self, ms: u64);
    fn play_animation(&mut self, url: &str, duration_s: f32, index: u32, scale: f32);
    fn stop_animation(&mut self);
    fn play_pose(&mut self, url: &str, duration_s: f32, index: u32, scale: f32);
    fn stop_pose(&mut self);
    fn play_gesture(&mut self, name: &str, duration_s: f32, mirror: bool);
    fn stop_gesture(&mut self, fade_ms: u64);
    fn look_at(&mut self, x: f32, y: f32, t_ms: u64);
    fn look_at_camera(&mut self, t_ms: u64);
    fn start(&mut self);
    fn stop(&mut self);

    fn camera_mut(&mut self) -> &mut CameraRig;
    fn light_mut(&mut self, slot: LightSlot) -> &mut LightRig;
}

/// A Head that keeps rig state but only logs its mutations. Used by the
/// `perform` subcommand to drive a full playback without a renderer.
pub struct NullHead {
    camera: CameraRig,
    ambient: LightRig,
    direct: LightRig,
    spot: LightRig,
}

impl Default for NullHead {
    fn default() -> Self {
        Self {
            camera: CameraRig::default(),
            ambient: LightRig::new("#ffffff", 0.5),
            direct: LightRig::new("#ffffff", 1.0),
            spot: LightRig::new("#ffffff", 20.0),
        }
    }
}

impl NullHead {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Head for NullHead {
    fn set_mood(&mut self, mood: Mood) {
        debug!("[HEAD] set_mood {}", mood);
    }
    fn set_value(&mut self, name: &str, value: f32) {
        debug!("[HEAD] set_value {} = {:.3}", name, value);
    }
    fn set_view(&mut self, view: CameraView, t_ms: u64) {
        debug!("[HEAD] set_view {} over {} ms", view, t_ms);
    }
    fn speak(&mut self, text: &str) {
        debug!("[HEAD] speak {:?}", text);
    }
    fn speak_audio(&mut self, cue: SpeechCue) {
        debug!("[HEAD] speak_audio {} ({} words)", cue.audio_url, cue.words.len());
    }
    fn speak_emoji(&mut self, emoji: &str) {
        debug!("[HEAD] speak_emoji {}", emoji);
    }
    fn speak_break(&mut self, ms: u64) {
        debug!("[HEAD] speak_break {} ms", ms);
    }
    fn play_animation(&mut self, url: &str, duration_s: f32, index: u32, scale: f32) {
        debug!(
            "[HEAD] play_animation {} dur {:.2}s idx {} scale {}",
            url, duration_s, index, scale
        );
    }
    fn stop_animation(&mut self) {
        debug!("[HEAD] stop_animation");
    }
    fn play_pose(&mut self, url: &str, duration_s: f32, index: u32, scale: f32) {
        debug!(
            "[HEAD] play_pose {} dur {:.2}s idx {} scale {}",
            url, duration_s, index, scale
        );
    }
    fn stop_pose(&mut self) {
        debug!("[HEAD] stop_pose");
    }
    fn play_gesture(&mut self, name: &str, duration_s: f32, mirror: bool) {
        debug!("[HEAD] play_gesture {} {:.2}s mirror={}", name, duration_s, mirror);
    }
    fn stop_gesture(&mut self, fade_ms: u64) {
        debug!("[HEAD] stop_gesture fade {} ms", fade_ms);
    }
    fn look_at(&mut self, x: f32, y: f32, t_ms: u64) {
        debug!("[HEAD] look_at ({:.2}, {:.2}) over {} ms", x, y, t_ms);
    }
    fn look_at_camera(&mut self, t_ms: u64) {
        debug!("[HEAD] look_at_camera over {} ms", t_ms);
    }
    fn start(&mut self) {
        debug!("[HEAD] start");
    }
    fn stop(&mut self) {
        debug!("[HEAD] stop");
    }

    fn camera_mut(&mut self) -> &mut CameraRig {
        &mut self.camera
    }
    fn light_mut(&mut self, slot: LightSlot) -> &mut LightRig {
        match slot {
            LightSlot::Ambient => &mut self.ambient,
            LightSlot::Direct => &mut self.direct,
            LightSlot::Spot => &mut self.spot,
        }
    }
}

/// Flat record of a Head mutation, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadCall {
    SetMood(Mood),
    SetValue(String, f32),
    SetView(CameraView, u64),
    Speak(String),
    SpeakAudio(String),
    SpeakEmoji(String),
    SpeakBreak(u64),
    PlayAnimation(String, f32),
    StopAnimation,
    PlayPose(String, f32),
    StopPose,
    PlayGesture(String, f32, bool),
    StopGesture(u64),
    LookAt(f32, f32, u64),
    LookAtCamera(u64),
    Start,
    Stop,
}

/// Test double that records every call in order.
#[derive(Default)]
pub struct RecordingHead {
    pub calls: Vec<HeadCall>,
    camera: CameraRig,
    ambient: LightRig,
    direct: LightRig,
    spot: LightRig,
}

impl Default for LightRig {
    fn default() -> Self {
        LightRig::new("#ffffff", 1.0)
    }
}

impl RecordingHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_named(&self, pred: impl Fn(&HeadCall) -> bool) -> Vec<&HeadCall> {
        self.calls.iter().filter(|c| pred(c)).collect()
    }
}

impl Head for RecordingHead {
    fn set_mood(&mut self, mood: Mood) {
        self.calls.push(HeadCall::SetMood(mood));
    }
    fn set_value(&mut self, name: &str, value: f32) {
        self.calls.push(HeadCall::SetValue(name.to_string(), value));
    }
    fn set_view(&mut self, view: CameraView, t_ms: u64) {
        self.calls.push(HeadCall::SetView(view, t_ms));
    }
    fn speak(&mut self, text: &str) {
        self.calls.push(HeadCall::Speak(text.to_string()));
    }
    fn speak_audio(&mut self, cue: SpeechCue) {
        self.calls.push(HeadCall::SpeakAudio(cue.audio_url));
    }
    fn speak_emoji(&mut self, emoji: &str) {
        self.calls.push(HeadCall::SpeakEmoji(emoji.to_string()));
    }
    fn speak_break(&mut self, ms: u64) {
        self.calls.push(HeadCall::SpeakBreak(ms));
    }
    fn play_animation(&mut self, url: &str, duration_s: f32, _index: u32, _scale: f32) {
        self.calls
            .push(HeadCall::PlayAnimation(url.to_string(), duration_s));
    }
    fn stop_animation(&mut self) {
        self.calls.push(HeadCall::StopAnimation);
    }
    fn play_pose(&mut self, url: &str, duration_s: f32, _index: u32, _scale: f32) {
        self.calls.push(HeadCall::PlayPose(url.to_string(), duration_s));
    }
    fn stop_pose(&mut self) {
        self.calls.push(HeadCall::StopPose);
    }
    fn play_gesture(&mut self, name: &str, duration_s: f32, mirror: bool) {
        self.calls
            .push(HeadCall::PlayGesture(name.to_string(), duration_s, mirror));
    }
    fn stop_gesture(&mut self, fade_ms: u64) {
        self.calls.push(HeadCall::StopGesture(fade_ms));
    }
    fn look_at(&mut self, x: f32, y: f32, t_ms: u64) {
        self.calls.push(HeadCall::LookAt(x, y, t_ms));
    }
    fn look_at_camera(&mut self, t_ms: u64) {
        self.calls.push(HeadCall::LookAtCamera(t_ms));
    }
    fn start(&mut self) {
        self.calls.push(HeadCall::Start);
    }
    fn stop(&mut self) {
        self.calls.push(HeadCall::Stop);
    }

    fn camera_mut(&mut self) -> &mut CameraRig {
        &mut self.camera
    }
    fn light_mut(&mut self, slot: LightSlot) -> &mut LightRig {
        match slot {
            LightSlot::Ambient => &mut self.ambient,
            LightSlot::Direct => &mut self.direct,
            LightSlot::Spot => &mut self.spot,
        }
    }
}

/// Like [`RecordingHead`], but the call log lives behind a shared handle so
/// a test can keep reading it after the head moves into an engine.
pub struct ProbeHead {
    log: Rc<RefCell<Vec<HeadCall>>>,
    camera: CameraRig,
    ambient: LightRig,
    direct: LightRig,
    spot: LightRig,
}

use std::cell::RefCell;
use std::rc::Rc;

impl ProbeHead {
    pub fn new() -> (Self, Rc<RefCell<Vec<HeadCall>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                log: log.clone(),
                camera: CameraRig::default(),
                ambient: LightRig::new("#ffffff", 0.5),
                direct: LightRig::new("#ffffff", 1.0),
                spot: LightRig::new("#ffffff", 20.0),
            },
            log,
        )
    }

    fn push(&self, call: HeadCall) {
        self.log.borrow_mut().push(call);
    }
}

impl Head for ProbeHead {
    fn set_mood(&mut self, mood: Mood) {
        self.push(HeadCall::SetMood(mood));
    }
    fn set_value(&mut self, name: &str, value: f32) {
        self.push(HeadCall::SetValue(name.to_string(), value));
    }
    fn set_view(&mut self, view: CameraView, t_ms: u64) {
        self.push(HeadCall::SetView(view, t_ms));
    }
    fn speak(&mut self, text: &str) {
        self.push(HeadCall::Speak(text.to_string()));
    }
    fn speak_audio(&mut self, cue: SpeechCue) {
        self.push(HeadCall::SpeakAudio(cue.audio_url));
    }
    fn speak_emoji(&mut self, emoji: &str) {
        self.push(HeadCall::SpeakEmoji(emoji.to_string()));
    }
    fn speak_break(&mut self, ms: u64) {
        self.push(HeadCall::SpeakBreak(ms));
    }
    fn play_animation(&mut self, url: &str, duration_s: f32, _index: u32, _scale: f32) {
        self.push(HeadCall::PlayAnimation(url.to_string(), duration_s));
    }
    fn stop_animation(&mut self) {
        self.push(HeadCall::StopAnimation);
    }
    fn play_pose(&mut self, url: &str, duration_s: f32, _index: u32, _scale: f32) {
        self.push(HeadCall::PlayPose(url.to_string(), duration_s));
    }
    fn stop_pose(&mut self) {
        self.push(HeadCall::StopPose);
    }
    fn play_gesture(&mut self, name: &str, duration_s: f32, mirror: bool) {
        self.push(HeadCall::PlayGesture(name.to_string(), duration_s, mirror));
    }
    fn stop_gesture(&mut self, fade_ms: u64) {
        self.push(HeadCall::StopGesture(fade_ms));
    }
    fn look_at(&mut self, x: f32, y: f32, t_ms: u64) {
        self.push(HeadCall::LookAt(x, y, t_ms));
    }
    fn look_at_camera(&mut self, t_ms: u64) {
        self.push(HeadCall::LookAtCamera(t_ms));
    }
    fn start(&mut self) {
        self.push(HeadCall::Start);
    }
    fn stop(&mut self) {
        self.push(HeadCall::Stop);
    }

    fn camera_mut(&mut self) -> &mut CameraRig {
        &mut self.camera
    }
    fn light_mut(&mut self, slot: LightSlot) -> &mut LightRig {
        match slot {
            LightSlot::Ambient => &mut self.ambient,
            LightSlot::Direct => &mut self.direct,
            LightSlot::Spot => &mut self.spot,
        }
    }
}
