// SERENADE Plan Model - semantic performance plan shared by the directors
// Copyright (c) 2026 SERENADE Project
//
// Directors emit partial plans as loosely-shaped JSON. Everything in here is
// about turning that JSON into a normalized `Plan`: windows clamped to the
// song, enums coerced into the closed vocabularies, action timestamps pinned
// inside their sections.

use crate::error::ParseError;
use crate::stage::{CameraView, LightPreset, Mood};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One lyrical window of the song, the unit the directors reason about.
/// Half-open `[start_ms, end_ms)`; sections partition the song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl Section {
    pub fn new(start_ms: u64, end_ms: u64, text: &str) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Solo,
    Ensemble,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "solo" => Some(Role::Solo),
            "ensemble" => Some(Role::Ensemble),
            _ => None,
        }
    }
}

/// Global styling hint mixed into every director prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StyleToken {
    #[default]
    Cinematic,
    Intimate,
    Hype,
    Minimal,
    Experimental,
}

impl StyleToken {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cinematic" => Some(StyleToken::Cinematic),
            "intimate" => Some(StyleToken::Intimate),
            "hype" => Some(StyleToken::Hype),
            "minimal" => Some(StyleToken::Minimal),
            "experimental" => Some(StyleToken::Experimental),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleToken::Cinematic => "cinematic",
            StyleToken::Intimate => "intimate",
            StyleToken::Hype => "hype",
            StyleToken::Minimal => "minimal",
            StyleToken::Experimental => "experimental",
        }
    }
}

/// Post effect vocabulary a section may tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FxKind {
    Bloom,
    Vignette,
    Chromatic,
    Glitch,
    Pixelation,
}

impl FxKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bloom" => Some(FxKind::Bloom),
            "vignette" => Some(FxKind::Vignette),
            "chromatic" | "chromatic_aberration" | "aberration" => Some(FxKind::Chromatic),
            "glitch" => Some(FxKind::Glitch),
            "pixelation" | "pixelate" | "pixel" => Some(FxKind::Pixelation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FxKind::Bloom => "bloom",
            FxKind::Vignette => "vignette",
            FxKind::Chromatic => "chromatic",
            FxKind::Glitch => "glitch",
            FxKind::Pixelation => "pixelation",
        }
    }
}

/// A timed verb with a free-form argument bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAction {
    pub time_ms: u64,
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    pub label: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<LightPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<FxKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub actions: Vec<PlanAction>,
}

impl PlanSection {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// A full (or partial, per director) performance plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub title: String,
    pub duration_ms: u64,
    pub sections: Vec<PlanSection>,
    #[serde(default)]
    pub actions: Vec<PlanAction>,
}

/// One director's normalized response: the plan plus its narration fields.
#[derive(Debug, Clone, Default)]
pub struct DirectorResponse {
    pub thoughts_summary: Option<String>,
    pub analysis: Option<String>,
    pub selection_reason: Option<String>,
    pub plan: Option<Plan>,
}

impl Plan {
    /// Normalize a raw JSON value into a Plan.
    ///
    /// Tolerates both `{plan:{sections:[...]}}` and bare `{sections:[...]}`
    /// (and deeper wrappings), clamps every window into `[0, duration_ms]`,
    /// drops empty windows, and coerces enums so unknown values degrade to
    /// absent rather than failing the parse.
    pub fn from_value(value: &Value, duration_ms: u64) -> Result<Plan, ParseError> {
        let holder = find_sections_holder(value)
            .ok_or_else(|| ParseError::InvalidShape("no sections array".to_string()))?;

        let raw_sections = holder
            .get("sections")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::InvalidShape("sections is not an array".to_string()))?;

        let mut sections = Vec::with_capacity(raw_sections.len());
        for (i, raw) in raw_sections.iter().enumerate() {
            if let Some(section) = normalize_section(raw, i, duration_ms) {
                sections.push(section);
            }
        }

        let actions = holder
            .get("actions")
            .and_then(Value::as_array)
            .map(|raw| normalize_actions(raw, 0, duration_ms))
            .unwrap_or_default();

        Ok(Plan {
            title: holder
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            duration_ms,
            sections,
            actions,
        })
    }
}

impl DirectorResponse {
    pub fn from_value(value: &Value, duration_ms: u64) -> Self {
        let plan = Plan::from_value(value, duration_ms)
            .ok()
            .filter(|p| !p.sections.is_empty());
        Self {
            thoughts_summary: string_field(value, "thoughts_summary"),
            analysis: string_field(value, "analysis"),
            selection_reason: string_field(value, "selection_reason"),
            plan,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Walk the value looking for the object that owns a `sections` array.
/// Directors sometimes emit the outer `plan` wrapper, sometimes not, and a
/// few models nest it one level deeper still.
fn find_sections_holder(value: &Value) -> Option<&Value> {
    if value
        .get("sections")
        .map(|s| s.is_array())
        .unwrap_or(false)
    {
        return Some(value);
    }
    if let Some(plan) = value.get("plan") {
        if let Some(found) = find_sections_holder(plan) {
            return Some(found);
        }
    }
    if let Some(obj) = value.as_object() {
        for (_, v) in obj {
            if v.is_object() {
                if let Some(found) = find_sections_holder(v) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn num_field(raw: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(v) = raw.get(*key) {
            if let Some(n) = v.as_i64() {
                return Some(n);
            }
            if let Some(f) = v.as_f64() {
                return Some(f as i64);
            }
            // Tolerate numbers that arrive quoted.
            if let Some(s) = v.as_str() {
                if let Ok(n) = s.trim().parse::<f64>() {
                    return Some(n as i64);
                }
            }
        }
    }
    None
}

fn normalize_section(raw: &Value, index: usize, duration_ms: u64) -> Option<PlanSection> {
    let start = num_field(raw, &["start_ms", "s", "start"])?;
    let end = num_field(raw, &["end_ms", "e", "end"])?;

    let start_ms = start.clamp(0, duration_ms as i64) as u64;
    let end_ms = end.clamp(0, duration_ms as i64) as u64;
    if end_ms <= start_ms {
        return None;
    }

    let label = raw
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("section {}", index + 1));

    let role = raw
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .unwrap_or_default();

    let actions = raw
        .get("actions")
        .and_then(Value::as_array)
        .map(|a| normalize_actions(a, start_ms, end_ms))
        .unwrap_or_default();

    Some(PlanSection {
        label,
        start_ms,
        end_ms,
        role,
        mood: raw.get("mood").and_then(Value::as_str).and_then(Mood::parse),
        camera: raw
            .get("camera")
            .and_then(Value::as_str)
            .and_then(CameraView::parse),
        light: raw
            .get("light")
            .and_then(Value::as_str)
            .and_then(LightPreset::parse),
        fx: raw.get("fx").and_then(Value::as_str).and_then(FxKind::parse),
        notes: raw
            .get("notes")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        actions,
    })
}

fn normalize_actions(raw: &[Value], window_start: u64, window_end: u64) -> Vec<PlanAction> {
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        let Some(name) = item.get("action").and_then(Value::as_str) else {
            continue;
        };
        let time = num_field(item, &["time_ms", "t", "time"]).unwrap_or(window_start as i64);
        let time_ms = (time.max(0) as u64).clamp(window_start, window_end);

        let mut args = item.get("args").cloned().unwrap_or(Value::Null);
        if name == "speak_emoji" {
            normalize_emoji_args(&mut args);
        }

        out.push(PlanAction {
            time_ms,
            action: name.to_string(),
            args,
        });
    }
    out
}

/// Directors tend to name emojis rather than emit the glyph. Map the known
/// names onto a fixed face set, neutral face when unrecognized.
pub fn emoji_for_name(name: &str) -> &'static str {
    match name.to_lowercase().as_str() {
        "happy" | "smile" | "joy" => "😊",
        "love" | "heart" => "😍",
        "sad" | "cry" => "😢",
        "angry" | "mad" => "😠",
        "fear" | "scared" => "😨",
        "disgust" => "🤢",
        "sleep" | "tired" => "😴",
        "surprise" | "wow" => "😮",
        "wink" => "😉",
        "laugh" => "😂",
        _ => "😐",
    }
}

fn normalize_emoji_args(args: &mut Value) {
    let named = args
        .get("emoji")
        .or_else(|| args.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(name) = named {
        // Already a glyph: leave it alone.
        if !name.is_ascii() {
            return;
        }
        let glyph = emoji_for_name(&name);
        if !args.is_object() {
            *args = Value::Object(serde_json::Map::new());
        }
        if let Some(obj) = args.as_object_mut() {
            obj.insert("emoji".to_string(), Value::String(glyph.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_wrapped_and_bare_plans() {
        let wrapped = json!({"plan": {"sections": [
            {"label": "v", "start_ms": 0, "end_ms": 1000, "role": "solo"}
        ]}});
        let bare = json!({"sections": [
            {"label": "v", "start_ms": 0, "end_ms": 1000, "role": "solo"}
        ]});
        let a = Plan::from_value(&wrapped, 1000).unwrap();
        let b = Plan::from_value(&bare, 1000).unwrap();
        assert_eq!(a.sections, b.sections);
        assert_eq!(a.sections[0].label, "v");
    }

    #[test]
    fn clamps_windows_into_song() {
        let raw = json!({"sections": [
            {"label": "x", "start_ms": -50, "end_ms": 10_000_000, "role": "solo"}
        ]});
        let plan = Plan::from_value(&raw, 30_000).unwrap();
        assert_eq!(plan.sections[0].start_ms, 0);
        assert_eq!(plan.sections[0].end_ms, 30_000);
    }

    #[test]
    fn drops_empty_windows() {
        let raw = json!({"sections": [
            {"label": "bad", "start_ms": 500, "end_ms": 500},
            {"label": "ok", "start_ms": 0, "end_ms": 100}
        ]});
        let plan = Plan::from_value(&raw, 1000).unwrap();
        assert_eq!(plan.sections.len(), 1);
        assert_eq!(plan.sections[0].label, "ok");
    }

    #[test]
    fn unknown_enums_degrade_to_none() {
        let raw = json!({"sections": [
            {"label": "x", "start_ms": 0, "end_ms": 1000,
             "mood": "ecstatic", "camera": "drone", "light": "noir"}
        ]});
        let plan = Plan::from_value(&raw, 1000).unwrap();
        let s = &plan.sections[0];
        assert_eq!(s.mood, None);
        assert_eq!(s.camera, None);
        assert_eq!(s.light, Some(LightPreset::Noir));
    }

    #[test]
    fn action_times_clamp_into_section_window() {
        let raw = json!({"sections": [
            {"label": "x", "start_ms": 1000, "end_ms": 2000, "actions": [
                {"time_ms": 100, "action": "set_mood", "args": {"mood": "happy"}},
                {"time_ms": 9000, "action": "play_gesture", "args": {"name": "wave"}}
            ]}
        ]});
        let plan = Plan::from_value(&raw, 5000).unwrap();
        let acts = &plan.sections[0].actions;
        assert_eq!(acts[0].time_ms, 1000);
        assert_eq!(acts[1].time_ms, 2000);
    }

    #[test]
    fn emoji_names_map_to_glyphs() {
        let raw = json!({"sections": [
            {"label": "x", "start_ms": 0, "end_ms": 1000, "actions": [
                {"time_ms": 0, "action": "speak_emoji", "args": {"emoji": "happy"}},
                {"time_ms": 10, "action": "speak_emoji", "args": {"emoji": "unknown_thing"}}
            ]}
        ]});
        let plan = Plan::from_value(&raw, 1000).unwrap();
        let acts = &plan.sections[0].actions;
        assert_eq!(acts[0].args["emoji"], "😊");
        assert_eq!(acts[1].args["emoji"], "😐");
    }
}
