// SERENADE LLM Client - streaming chat-completions transport
// Copyright (c) 2026 SERENADE Project
//
// One POST per attempt against an OpenAI-compatible server. Two cancellation
// sources are honored at every await point: the per-attempt deadline and the
// caller's token. Retries back off exponentially and only fire for transport
// faults worth retrying.

use crate::config::Settings;
use crate::error::TransportError;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Delta callback: (new content, accumulated content).
pub type ChunkSink<'a> = &'a mut dyn FnMut(&str, &str);

fn reborrow_sink<'a>(on_chunk: &'a mut Option<ChunkSink<'_>>) -> Option<ChunkSink<'a>> {
    match on_chunk {
        Some(s) => Some(&mut **s),
        None => None,
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.llm_base_url.clone(),
            api_key: settings.llm_api_key.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Issue the request with retries. Attempts are 1..=retries+1; backoff is
    /// `retry_base_ms * 2^(attempt-1)`. Never retries after external cancel.
    pub async fn request(
        &self,
        req: &LlmRequest,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, TransportError> {
        let mut on_chunk = on_chunk;
        let mut last_err = TransportError::Network("no attempt made".to_string());

        for attempt in 0..=req.retries {
            if attempt > 0 {
                let backoff = req.retry_base_ms.saturating_mul(1 << (attempt - 1));
                debug!(
                    "[LLM] attempt {} backing off {} ms",
                    attempt + 1,
                    backoff
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                }
            }

            let sink = reborrow_sink(&mut on_chunk);
            match self.attempt(req, sink, cancel).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if e.is_retryable() && attempt < req.retries && !cancel.is_cancelled() {
                        warn!("[LLM] attempt {} failed ({}); retrying", attempt + 1, e);
                        last_err = e;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Err(last_err)
    }

    async fn attempt(
        &self,
        req: &LlmRequest,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, TransportError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(req.timeout_ms)) => {
                Err(TransportError::Timeout(req.timeout_ms))
            }
            result = self.send(req, on_chunk) => result,
        }
    }

    async fn send(
        &self,
        req: &LlmRequest,
        on_chunk: Option<ChunkSink<'_>>,
    ) -> Result<LlmResponse, TransportError> {
        let body = json!({
            "model": req.model,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "stream": req.stream,
            "messages": [
                {"role": "system", "content": req.system_prompt},
                {"role": "user", "content": req.user_prompt},
            ],
        });

        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        if req.stream {
            consume_sse(response, on_chunk).await
        } else {
            let value: Value = response
                .json()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            Ok(parse_completion(&value))
        }
    }
}

fn parse_completion(value: &Value) -> LlmResponse {
    let choice = &value["choices"][0];
    LlmResponse {
        content: choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        usage: value.get("usage").map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
        }),
    }
}

/// Read server-sent events line by line. Partially received event lines stay
/// buffered until a newline completes them.
async fn consume_sse(
    response: reqwest::Response,
    mut on_chunk: Option<ChunkSink<'_>>,
) -> Result<LlmResponse, TransportError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut accumulated = String::new();
    let mut finish_reason = None;

    'outer: while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| TransportError::Network(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            match sse_payload(line.trim_end()) {
                SsePayload::Done => break 'outer,
                SsePayload::Event(payload) => {
                    if let Ok(event) = serde_json::from_str::<Value>(&payload) {
                        if let Some(delta) = delta_content(&event) {
                            accumulated.push_str(delta);
                            if let Some(sink) = on_chunk.as_mut() {
                                sink(delta, &accumulated);
                            }
                        }
                        if let Some(reason) = event["choices"][0]["finish_reason"].as_str() {
                            finish_reason = Some(reason.to_string());
                        }
                    }
                }
                SsePayload::Ignore => {}
            }
        }
    }

    Ok(LlmResponse {
        content: accumulated,
        finish_reason,
        usage: None,
    })
}

enum SsePayload {
    Event(String),
    Done,
    Ignore,
}

fn sse_payload(line: &str) -> SsePayload {
    let Some(rest) = line.strip_prefix("data:") else {
        return SsePayload::Ignore;
    };
    let payload = rest.trim();
    if payload == "[DONE]" {
        SsePayload::Done
    } else if payload.is_empty() {
        SsePayload::Ignore
    } else {
        SsePayload::Event(payload.to_string())
    }
}

fn delta_content(event: &Value) -> Option<&str> {
    event["choices"][0]["delta"]["content"].as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_classify() {
        assert!(matches!(sse_payload("data: [DONE]"), SsePayload::Done));
        assert!(matches!(sse_payload("data: {\"x\":1}"), SsePayload::Event(_)));
        assert!(matches!(sse_payload(": keepalive"), SsePayload::Ignore));
        assert!(matches!(sse_payload(""), SsePayload::Ignore));
    }

    #[test]
    fn delta_extraction() {
        let event: Value = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(delta_content(&event), Some("hel"));
    }

    #[test]
    fn completion_parsing_includes_usage() {
        let value: Value = serde_json::from_str(
            r#"{
                "choices":[{"message":{"content":"{}"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}
            }"#,
        )
        .unwrap();
        let resp = parse_completion(&value);
        assert_eq!(resp.content, "{}");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 46);
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let mut settings = Settings::default();
        settings.llm_base_url = "http://localhost:8080/".to_string();
        let client = LlmClient::new(&settings);
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let client = LlmClient::new(&Settings::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let req = LlmRequest {
            model: "m".to_string(),
            system_prompt: String::new(),
            user_prompt: String::new(),
            max_tokens: 16,
            temperature: 0.7,
            stream: false,
            timeout_ms: 50,
            retries: 0,
            retry_base_ms: 1,
        };
        let err = client.request(&req, None, &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
