// SERENADE JSON Extractor - recover plan JSON from raw model output
// Copyright (c) 2026 SERENADE Project
//
// Models wrap their JSON in whatever their vendor taught them: markdown
// fences, chatty preambles, or channel-tagged framings of the form
// <|channel|>final<|message|>...<|end|>. This module digs the intended
// object out of all of them and repairs truncated tails.

use crate::error::ParseError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Canonical channels. Vendor tag names are open-ended; everything maps onto
/// one of these three, and the last `final` span wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Analysis,
    Commentary,
    Final,
}

fn channel_alias(name: &str) -> Option<Channel> {
    match name.to_lowercase().as_str() {
        "analysis" | "thinking" | "think" | "reasoning" => Some(Channel::Analysis),
        "commentary" => Some(Channel::Commentary),
        "final" | "response" | "assistant" | "answer" => Some(Channel::Final),
        _ => None,
    }
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\|([a-zA-Z_]+)\|>").unwrap())
}

/// Extract the intended JSON object from raw model output and return it as
/// parsed JSON, repairing truncated brackets when necessary.
pub fn extract_value(raw: &str) -> Result<Value, ParseError> {
    let text = extract_json(raw)?;
    serde_json::from_str(&text).map_err(|_| ParseError::RepairExhausted)
}

/// Like [`extract_value`] but returns the JSON text.
pub fn extract_json(raw: &str) -> Result<String, ParseError> {
    if raw.contains("<|") {
        let spans = channel_spans(raw);
        let mut saw_final = false;
        for (channel, content) in spans.iter().rev() {
            if *channel != Channel::Final {
                continue;
            }
            saw_final = true;
            if let Ok(json) = pick_object(content) {
                return Ok(json);
            }
        }
        // No usable final span: drop every tag and scan the whole string.
        let stripped = token_re().replace_all(raw, " ");
        return pick_object(&stripped).map_err(|e| {
            if saw_final {
                e
            } else {
                ParseError::NoChannelFound
            }
        });
    }

    pick_object(&strip_fences(raw))
}

/// Split channel-tagged output into (channel, content) spans in order.
fn channel_spans(raw: &str) -> Vec<(Channel, String)> {
    let mut spans: Vec<(Channel, String)> = Vec::new();
    let mut current: Option<Channel> = None;
    let mut expecting_name = false;
    let mut cursor = 0;

    let mut push_text = |spans: &mut Vec<(Channel, String)>,
                         current: &mut Option<Channel>,
                         expecting_name: &mut bool,
                         chunk: &str| {
        if chunk.is_empty() {
            return;
        }
        if *expecting_name {
            // The chunk opens with the channel name; anything after the first
            // word is already content.
            let trimmed = chunk.trim_start();
            let name_end = trimmed
                .find(|c: char| c.is_whitespace())
                .unwrap_or(trimmed.len());
            let (name, rest) = trimmed.split_at(name_end);
            *current = channel_alias(name);
            *expecting_name = false;
            if let (Some(ch), false) = (*current, rest.trim().is_empty()) {
                spans.push((ch, rest.to_string()));
            }
        } else if let Some(ch) = *current {
            spans.push((ch, chunk.to_string()));
        }
    };

    for m in token_re().find_iter(raw) {
        let chunk = &raw[cursor..m.start()];
        push_text(&mut spans, &mut current, &mut expecting_name, chunk);
        cursor = m.end();

        let name = &raw[m.start() + 2..m.end() - 2];
        match name.to_lowercase().as_str() {
            "channel" => expecting_name = true,
            "message" | "start" | "constrain" => {}
            "end" | "return" | "stop" => current = None,
            other => {
                if let Some(ch) = channel_alias(other) {
                    current = Some(ch);
                }
            }
        }
    }
    push_text(&mut spans, &mut current, &mut expecting_name, &raw[cursor..]);
    spans
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "\n").replace("```", "\n")
}

/// Scan for balanced top-level objects, reject schema-example echoes, prefer
/// the last parseable candidate, and fall back to truncation repair.
fn pick_object(text: &str) -> Result<String, ParseError> {
    let candidates = balanced_objects(text);
    let mut rejected_example = false;

    for (start, end) in candidates.iter().rev() {
        let candidate = &text[*start..*end];
        if looks_like_schema_example(candidate) {
            rejected_example = true;
            continue;
        }
        let cleaned = strip_trailing_commas(candidate);
        if serde_json::from_str::<Value>(&cleaned).is_ok() {
            return Ok(cleaned);
        }
    }

    // Nothing balanced parsed: attempt to repair a truncated object from the
    // last viable opening brace.
    if let Some(open) = last_unclosed_open(text, &candidates) {
        let fragment = &text[open..];
        if !looks_like_schema_example(fragment) {
            let repaired = repair_fragment(fragment);
            if serde_json::from_str::<Value>(&repaired).is_ok() {
                return Ok(repaired);
            }
            return Err(ParseError::RepairExhausted);
        }
    }

    if rejected_example {
        Err(ParseError::SchemaExampleRejected)
    } else {
        Err(ParseError::NoBalancedJson)
    }
}

/// Byte ranges of balanced `{...}` objects at nesting depth zero, honoring
/// string literals and backslash escapes.
fn balanced_objects(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            match close_of(bytes, i) {
                Some(end) => {
                    spans.push((i, end + 1));
                    i = end + 1;
                    continue;
                }
                None => break,
            }
        }
        i += 1;
    }
    spans
}

fn close_of(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut in_str = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' | b'[' => depth += 1,
            b']' => depth -= 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    None
}

/// Offset of the first `{` after the final complete candidate, i.e. the
/// start of a truncated trailing object, if any.
fn last_unclosed_open(text: &str, complete: &[(usize, usize)]) -> Option<usize> {
    let from = complete.last().map(|(_, end)| *end).unwrap_or(0);
    text[from..].find('{').map(|off| from + off)
}

/// Prompt-template echoes carry unquoted type identifiers after colons
/// (`"start_ms": number`) or alternation in string position (`"a" | "b"`).
/// Real data never does.
fn looks_like_schema_example(candidate: &str) -> bool {
    static TYPE_RE: OnceLock<Regex> = OnceLock::new();
    static ALT_RE: OnceLock<Regex> = OnceLock::new();
    let type_re = TYPE_RE.get_or_init(|| {
        Regex::new(r#":\s*(number|string|boolean|bool|integer|int|float|object|array)\s*[,}\]]"#)
            .unwrap()
    });
    let alt_re = ALT_RE.get_or_init(|| Regex::new(r#""\s*\|\s*""#).unwrap());
    type_re.is_match(candidate) || alt_re.is_match(candidate)
}

/// Remove commas that directly precede a closer, outside strings.
fn strip_trailing_commas(candidate: &str) -> String {
    let bytes = candidate.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_str = false;
    let mut escape = false;
    for &b in bytes {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            out.push(b);
            continue;
        }
        if b == b'"' {
            in_str = true;
            out.push(b);
            continue;
        }
        if b == b'}' || b == b']' {
            // Drop any comma (and whitespace) hanging before this closer.
            let mut k = out.len();
            while k > 0 && (out[k - 1] as char).is_whitespace() {
                k -= 1;
            }
            if k > 0 && out[k - 1] == b',' {
                out.drain(k - 1..k);
            }
        }
        out.push(b);
    }
    String::from_utf8(out).unwrap_or_else(|_| candidate.to_string())
}

/// Close an unterminated string, then append the minimal closer sequence for
/// whatever is still open, trimming dangling commas along the way.
fn repair_fragment(fragment: &str) -> String {
    let bytes = fragment.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_str = false;
    let mut escape = false;
    for &b in bytes {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.last() == Some(&b) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = fragment.to_string();
    if in_str {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        loop {
            let trimmed = repaired.trim_end();
            if trimmed.ends_with(',') {
                repaired = trimmed[..trimmed.len() - 1].to_string();
            } else {
                repaired = trimmed.to_string();
                break;
            }
        }
        repaired.push(closer as char);
    }
    strip_trailing_commas(&repaired)
}
