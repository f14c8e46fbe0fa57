// SERENADE Effects Surface - post-processing compositor operations
// Copyright (c) 2026 SERENADE Project

use tracing::debug;

/// Capability surface of the external post-effects compositor.
///
/// Owned by the FX executor; nothing else writes post state.
pub trait Effects {
    fn set_bloom(&mut self, strength: f32, radius: f32, threshold: f32);
    fn set_vignette(&mut self, darkness: f32, offset: f32);
    fn set_chromatic_aberration(&mut self, offset: f32);
    fn set_glitch(&mut self, intensity: f32, wild: bool);
    fn set_pixelation(&mut self, size: f32);
    fn reset_effects(&mut self);
}

/// Logging stand-in for headless runs.
#[derive(Debug, Default)]
pub struct NullEffects;

impl Effects for NullEffects {
    fn set_bloom(&mut self, strength: f32, radius: f32, threshold: f32) {
        debug!("[FX] bloom strength={:.2} radius={:.2} threshold={:.2}", strength, radius, threshold);
    }
    fn set_vignette(&mut self, darkness: f32, offset: f32) {
        debug!("[FX] vignette darkness={:.2} offset={:.2}", darkness, offset);
    }
    fn set_chromatic_aberration(&mut self, offset: f32) {
        debug!("[FX] chromatic offset={:.4}", offset);
    }
    fn set_glitch(&mut self, intensity: f32, wild: bool) {
        debug!("[FX] glitch intensity={:.2} wild={}", intensity, wild);
    }
    fn set_pixelation(&mut self, size: f32) {
        debug!("[FX] pixelation size={:.2}", size);
    }
    fn reset_effects(&mut self) {
        debug!("[FX] reset");
    }
}

/// Flat record of a compositor call, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum FxCall {
    Bloom(f32, f32, f32),
    Vignette(f32, f32),
    Chromatic(f32),
    Glitch(f32, bool),
    Pixelation(f32),
    Reset,
}

/// Test double that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingEffects {
    pub calls: Vec<FxCall>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effects for RecordingEffects {
    fn set_bloom(&mut self, strength: f32, radius: f32, threshold: f32) {
        self.calls.push(FxCall::Bloom(strength, radius, threshold));
    }
    fn set_vignette(&mut self, darkness: f32, offset: f32) {
        self.calls.push(FxCall::Vignette(darkness, offset));
    }
    fn set_chromatic_aberration(&mut self, offset: f32) {
        self.calls.push(FxCall::Chromatic(offset));
    }
    fn set_glitch(&mut self, intensity: f32, wild: bool) {
        self.calls.push(FxCall::Glitch(intensity, wild));
    }
    fn set_pixelation(&mut self, size: f32) {
        self.calls.push(FxCall::Pixelation(size));
    }
    fn reset_effects(&mut self) {
        self.calls.push(FxCall::Reset);
    }
}
