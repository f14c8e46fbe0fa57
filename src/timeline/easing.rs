// SERENADE Easing Catalog
// Copyright (c) 2026 SERENADE Project

use serde::{Deserialize, Serialize};

/// Easing curves available to blocks and keyframes. All curves map
/// `[0, 1] -> [0, 1]` with `eval(0) == 0` and `eval(1) == 1`; `Step` holds 0
/// until the very end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Bounce,
    Elastic,
    Step,
}

impl Easing {
    pub fn eval(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::Bounce => bounce_out(t),
            Easing::Elastic => elastic_out(t),
            Easing::Step => {
                if t < 1.0 {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "linear" => Some(Easing::Linear),
            "ease_in" | "easein" => Some(Easing::EaseIn),
            "ease_out" | "easeout" => Some(Easing::EaseOut),
            "ease_in_out" | "easeinout" => Some(Easing::EaseInOut),
            "bounce" => Some(Easing::Bounce),
            "elastic" => Some(Easing::Elastic),
            "step" => Some(Easing::Step),
            _ => None,
        }
    }
}

// Standard four-segment bounce.
fn bounce_out(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984_375
    }
}

// Decayed sine; endpoints pinned so the curve is exact at 0 and 1.
fn elastic_out(t: f32) -> f32 {
    const C4: f32 = std::f32::consts::TAU / 3.0;
    if t <= 0.0 {
        0.0
    } else if t >= 1.0 {
        1.0
    } else {
        2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * C4).sin() + 1.0
    }
}
