// SERENADE Runtime Settings
// Copyright (c) 2026 SERENADE Project

use std::env;

/// Settings for the director LLM endpoint and request policy.
///
/// Read once at startup from the environment (a `.env` file is honored by
/// the binary before this is called).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible server, without the /v1 suffix.
    pub llm_base_url: String,
    /// Model identifier passed in every chat-completions request.
    pub llm_model: String,
    /// Optional bearer token.
    pub llm_api_key: Option<String>,
    /// Per-attempt deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// Retries after the first attempt.
    pub request_retries: u32,
    /// Base backoff in milliseconds, doubled per attempt.
    pub retry_base_ms: u64,
    /// Stream responses over SSE instead of waiting for the full body.
    pub stream_responses: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434".to_string(),
            llm_model: "gpt-oss:20b".to_string(),
            llm_api_key: None,
            request_timeout_ms: 120_000,
            request_retries: 2,
            retry_base_ms: 750,
            stream_responses: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_base_url: env::var("SERENADE_LLM_URL").unwrap_or(defaults.llm_base_url),
            llm_model: env::var("SERENADE_LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_api_key: env::var("SERENADE_LLM_KEY").ok().filter(|k| !k.is_empty()),
            request_timeout_ms: env_u64("SERENADE_LLM_TIMEOUT_MS", defaults.request_timeout_ms),
            request_retries: env_u64("SERENADE_LLM_RETRIES", defaults.request_retries as u64)
                as u32,
            retry_base_ms: env_u64("SERENADE_LLM_RETRY_BASE_MS", defaults.retry_base_ms),
            stream_responses: env::var("SERENADE_LLM_STREAM")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(defaults.stream_responses),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert!(s.llm_base_url.starts_with("http"));
        assert!(s.request_timeout_ms > 0);
        assert!(s.stream_responses);
    }
}
