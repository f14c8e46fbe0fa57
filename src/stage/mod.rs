// SERENADE Stage - external rig and compositor surfaces
// Copyright (c) 2026 SERENADE Project

pub mod effects;
pub mod head;

pub use effects::{Effects, NullEffects, RecordingEffects};
pub use head::{
    CameraRig, CameraView, Head, HeadCall, LightPreset, LightRig, LightSlot, Mood, NullHead,
    ProbeHead, RecordingHead, SpeechCue,
};
