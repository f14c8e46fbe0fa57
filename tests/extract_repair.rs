// End-to-end extraction scenarios: channel framing, schema echoes,
// truncation repair, and normalization clamping.

use serenade_core::director::plan::{Plan, Role};
use serenade_core::director::{PlanAssembler, Section};

#[test]
fn channel_tagged_output_yields_the_final_plan() {
    let raw = "<|channel|>analysis<|message|>think<|channel|>final<|message|>{\"plan\":{\"sections\":[{\"label\":\"v\",\"start_ms\":0,\"end_ms\":1000,\"role\":\"solo\"}]}}<|end|>";

    let mut asm = PlanAssembler::new();
    asm.append(raw);
    let response = asm.finish(1000).unwrap();
    let plan = response.plan.expect("plan parsed");

    assert_eq!(plan.sections.len(), 1);
    let section = &plan.sections[0];
    assert_eq!(section.label, "v");
    assert_eq!(section.start_ms, 0);
    assert_eq!(section.end_ms, 1000);
    assert_eq!(section.role, Role::Solo);
}

#[test]
fn schema_example_echo_is_skipped_for_the_real_object() {
    let raw = r#"The shape is { "start_ms": number, "end_ms": number, "role": "solo" | "ensemble" }
and here is my answer:
{"sections":[{"label":"chorus","start_ms":100,"end_ms":900,"role":"ensemble"}]}"#;

    let mut asm = PlanAssembler::new();
    asm.append(raw);
    let plan = asm.finish(1000).unwrap().plan.expect("plan parsed");
    assert_eq!(plan.sections[0].label, "chorus");
    assert_eq!(plan.sections[0].role, Role::Ensemble);
}

#[test]
fn truncated_stream_is_repaired_into_a_section() {
    let raw = r#"{"plan":{"sections":[{"label":"a","start_ms":0,"end_ms":500,"role":"solo""#;

    let mut asm = PlanAssembler::new();
    asm.append(raw);
    let plan = asm.finish(1000).unwrap().plan.expect("repaired plan");
    assert_eq!(plan.sections.len(), 1);
    assert_eq!(plan.sections[0].end_ms, 500);
}

#[test]
fn out_of_range_windows_clamp_to_the_song() {
    let raw = r#"{"sections":[{"label":"x","start_ms":-50,"end_ms":10000000,"role":"solo"}]}"#;

    let mut asm = PlanAssembler::new();
    asm.append(raw);
    let plan = asm.finish(30_000).unwrap().plan.expect("plan parsed");
    assert_eq!(plan.sections[0].start_ms, 0);
    assert_eq!(plan.sections[0].end_ms, 30_000);
}

// Serialize a normalized plan, run it back through the parser, and the
// result is identical: normalization is idempotent.
#[test]
fn parse_of_serialized_plan_is_identity() {
    let raw = r#"{
        "thoughts_summary": "verse quiet, chorus loud",
        "plan": {
            "title": "midnight run",
            "sections": [
                {"label": "verse", "start_ms": 0, "end_ms": 8000, "role": "solo",
                 "mood": "sad", "camera": "mid", "light": "noir",
                 "actions": [{"time_ms": 4000, "action": "look_at_camera", "args": {"t": 600}}]},
                {"label": "chorus", "start_ms": 8000, "end_ms": 16000, "role": "ensemble",
                 "mood": "happy", "camera": "full", "light": "neon"}
            ]
        }
    }"#;

    let mut asm = PlanAssembler::new();
    asm.append(raw);
    let first = asm.finish(16_000).unwrap().plan.unwrap();

    let serialized = serde_json::to_string(&first).unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&serialized).unwrap();
    let second = Plan::from_value(&reparsed, 16_000).unwrap();

    assert_eq!(first, second);
}

#[test]
fn streaming_in_fragments_matches_one_shot_append() {
    let raw = r#"{"plan":{"sections":[{"label":"v","start_ms":0,"end_ms":900,"role":"solo"}]}}"#;

    let mut whole = PlanAssembler::new();
    whole.append(raw);

    let mut pieces = PlanAssembler::new();
    for chunk in raw.as_bytes().chunks(7) {
        pieces.append(std::str::from_utf8(chunk).unwrap());
    }

    assert_eq!(
        whole.finish(900).unwrap().plan,
        pieces.finish(900).unwrap().plan
    );
}

#[test]
fn sections_helper_builds_valid_windows() {
    let section = Section::new(0, 1000, "hello");
    assert!(section.start_ms < section.end_ms);
}
