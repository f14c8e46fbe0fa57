// SERENADE Plan Assembler - incremental progress over a streamed response
// Copyright (c) 2026 SERENADE Project
//
// While a director streams, the UI wants cheap signals: the model's summary
// of its thinking, and how many sections have materialized so far. Both are
// regex probes over the accumulated buffer; the real parse happens once, at
// end of stream.

use crate::director::extract::extract_value;
use crate::director::plan::DirectorResponse;
use crate::error::ParseError;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamProgress {
    /// Extracted once, the first time the field is seen.
    pub thoughts_summary: Option<String>,
    /// Count of completed sections so far. The `role` field lands near the
    /// end of each section object, which makes it a fair completion proxy.
    pub sections_found: usize,
    /// Index of the section currently streaming in, when any text has
    /// arrived.
    pub current_section: Option<usize>,
    pub is_complete: bool,
}

fn thoughts_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""thoughts_summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap()
    })
}

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""role"\s*:\s*"(solo|ensemble)""#).unwrap())
}

/// Append-only assembler for one director's streamed output.
#[derive(Debug, Default)]
pub struct PlanAssembler {
    buffer: String,
    thoughts: Option<String>,
}

impl PlanAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn append(&mut self, chunk: &str) -> StreamProgress {
        self.buffer.push_str(chunk);

        if self.thoughts.is_none() {
            if let Some(cap) = thoughts_re().captures(&self.buffer) {
                self.thoughts = Some(cap[1].replace("\\\"", "\"").replace("\\n", " "));
            }
        }

        let sections_found = role_re().find_iter(&self.buffer).count();
        let trimmed = self.buffer.trim_end();
        let is_complete = (trimmed.ends_with('}') || trimmed.ends_with("}]"))
            && serde_json::from_str::<serde_json::Value>(trimmed).is_ok();

        StreamProgress {
            thoughts_summary: self.thoughts.clone(),
            sections_found,
            current_section: if self.buffer.is_empty() {
                None
            } else {
                Some(sections_found)
            },
            is_complete,
        }
    }

    /// End-of-stream parse: model-aware extraction plus bracket repair, then
    /// shape normalization against the song duration.
    pub fn finish(&self, duration_ms: u64) -> Result<DirectorResponse, ParseError> {
        let value = extract_value(&self.buffer)?;
        Ok(DirectorResponse::from_value(&value, duration_ms))
    }
}
