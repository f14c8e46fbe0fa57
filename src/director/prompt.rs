// SERENADE Director Prompts - role briefs for the three-stage chain
// Copyright (c) 2026 SERENADE Project

use crate::director::plan::{Plan, Section, StyleToken};
use crate::stage::{CameraView, LightPreset};
use std::fmt;

const SECTION_TEXT_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectorRole {
    Performance,
    Stage,
    Camera,
}

impl DirectorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectorRole::Performance => "performance",
            DirectorRole::Stage => "stage",
            DirectorRole::Camera => "camera",
        }
    }
}

impl fmt::Display for DirectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a role brief needs. Earlier directors' plans feed later roles.
pub struct PromptContext<'a> {
    pub sections: &'a [Section],
    pub duration_ms: u64,
    pub style: StyleToken,
    pub seed: &'a str,
    pub default_light: LightPreset,
    pub default_camera: CameraView,
    pub performance: Option<&'a Plan>,
    pub stage: Option<&'a Plan>,
}

/// Token budget per role, monotonic in section count. The camera brief asks
/// for less because its per-section output is smaller.
pub fn estimate_max_tokens(role: DirectorRole, section_count: usize) -> u32 {
    let n = section_count as u32;
    match role {
        DirectorRole::Performance => 900 + 320 * n,
        DirectorRole::Stage => 700 + 190 * n,
        DirectorRole::Camera => 600 + 150 * n,
    }
}

const JSON_CONTRACT: &str = r#"Respond with ONLY a JSON object, no prose and no markdown fences, shaped exactly like:
{
  "thoughts_summary": string,
  "analysis": string,
  "selection_reason": string,
  "plan": {
    "title": string,
    "sections": [
      { "label": string,
        "start_ms": number, "end_ms": number,
        "role": "solo" | "ensemble",
        "mood": string, "camera": string, "light": string,
        "notes": string,
        "actions": [ { "time_ms": number, "action": string, "args": object } ] }
    ],
    "actions": [ ]
  }
}
Keep thoughts_summary under 50 words. Section start_ms/end_ms must match the input windows exactly."#;

const VOCABULARY: &str = "Closed vocabulary:\n\
moods: neutral, happy, love, fear, sad, angry, disgust, sleep\n\
gestures: handup, index, ok, thumbup, thumbdown, side, shrug\n\
camera views: full, mid, upper, head\n\
light presets: neon, noir, sunset, frost, crimson";

pub fn build_prompts(role: DirectorRole, ctx: &PromptContext<'_>) -> (String, String) {
    let system = match role {
        DirectorRole::Performance => format!(
            "You are the performance director for an animated singer. For every \
             lyric section choose the mood, the solo/ensemble role, and timed \
             actions (set_mood, play_gesture, make_facial_expression, speak_emoji, \
             look_at_camera) that sell the song.\n{}\n{}",
            VOCABULARY, JSON_CONTRACT
        ),
        DirectorRole::Stage => format!(
            "You are the stage director for an animated singer. The performance \
             plan is already fixed; you only choose the `light` preset per section \
             and stage-scoped actions (set_light_preset). Do not change moods, \
             roles, or any other field.\n{}\n{}",
            VOCABULARY, JSON_CONTRACT
        ),
        DirectorRole::Camera => format!(
            "You are the camera director for an animated singer. The performance \
             plan is already fixed; you only choose the `camera` view per section \
             and camera-scoped actions (set_view, camera_dolly, camera_pan, \
             camera_tilt, camera_orbit, camera_punch, camera_sweep, camera_shake). \
             Do not change moods, roles, or lights.\n{}\n{}",
            VOCABULARY, JSON_CONTRACT
        ),
    };

    let mut user = String::new();
    user.push_str(&format!(
        "Song duration: {} ms. Style: {}. Seed: {}.\n",
        ctx.duration_ms,
        ctx.style.as_str(),
        ctx.seed
    ));
    user.push_str(&format!(
        "Defaults: light={}, camera={}.\n",
        ctx.default_light, ctx.default_camera
    ));
    user.push_str("Sections (i, s=start_ms, e=end_ms, t=lyric):\n");
    for (i, section) in ctx.sections.iter().enumerate() {
        user.push_str(&compact_record(i, section, ctx));
        user.push('\n');
    }

    (system, user)
}

/// One compact per-section line, lyric capped at 200 chars, enriched with
/// whatever the earlier directors decided for the same window.
fn compact_record(i: usize, section: &Section, ctx: &PromptContext<'_>) -> String {
    let mut text: String = section.text.chars().take(SECTION_TEXT_CAP).collect();
    text = text.replace('"', "'");

    let mut record = format!(
        "{{\"i\":{},\"s\":{},\"e\":{},\"t\":\"{}\"",
        i, section.start_ms, section.end_ms, text
    );

    if let Some(perf) = ctx.performance {
        if let Some(ps) = perf.sections.get(i) {
            record.push_str(&format!(",\"role\":\"{:?}\"", ps.role).to_lowercase());
            if let Some(mood) = ps.mood {
                record.push_str(&format!(",\"mood\":\"{}\"", mood));
            }
        }
    }
    if let Some(stage) = ctx.stage {
        if let Some(ss) = stage.sections.get(i) {
            if let Some(light) = ss.light {
                record.push_str(&format!(",\"light\":\"{}\"", light));
            }
        }
    }
    record.push('}');
    record
}
