// SERENADE Error Taxonomy
// Copyright (c) 2026 SERENADE Project

use crate::timeline::LayerId;
use thiserror::Error;

/// Transport-level failures from the LLM client.
///
/// Only `Timeout`, `Network` and `Status(>=500 | 429)` are retryable; all
/// other statuses are fatal for the attempt, and `Cancelled` is fatal for
/// the whole request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Network(_) => true,
            TransportError::Status(code) => *code >= 500 || *code == 429,
            TransportError::Cancelled => false,
        }
    }
}

/// Failures while recovering a JSON plan from raw model output.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("no channel-tagged span contained usable output")]
    NoChannelFound,

    #[error("no balanced JSON object found in model output")]
    NoBalancedJson,

    #[error("candidate object is a schema example, not data")]
    SchemaExampleRejected,

    #[error("bracket repair did not produce parseable JSON")]
    RepairExhausted,

    #[error("plan shape invalid: {0}")]
    InvalidShape(String),
}

/// Semantic plan validation failures. These trigger the heuristic fallback
/// rather than aborting the pipeline.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("plan contains no sections")]
    NoSections,

    #[error("section {index} window invalid: [{start_ms}, {end_ms})")]
    SectionWindowInvalid {
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },
}

/// Playback engine failures.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("resource load failed on {layer} layer: {reason}")]
    LoadResourcesFailed { layer: LayerId, reason: String },

    #[error("{layer} executor does not understand action '{action}'")]
    UnknownAction { layer: LayerId, action: String },

    #[error("a playback listener panicked")]
    ListenerPanicked,

    #[error("operation not valid in state {0}")]
    InvalidState(&'static str),
}

/// Crate-level error for callers that do not care which subsystem failed.
#[derive(Debug, Error)]
pub enum SerenadeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(TransportError::Status(500).is_retryable());
        assert!(TransportError::Status(503).is_retryable());
        assert!(TransportError::Status(429).is_retryable());
        assert!(!TransportError::Status(400).is_retryable());
        assert!(!TransportError::Status(404).is_retryable());
        assert!(TransportError::Timeout(30_000).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
    }
}
