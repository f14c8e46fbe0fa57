// SERENADE Director Chain
// Copyright (c) 2026 SERENADE Project
//
// Three LLM directors in sequence: Performance decides what the avatar does,
// Stage lights it, Camera frames it. Everything downstream of the raw model
// bytes lives here: extraction, incremental assembly, prompts, and the
// orchestrating pipeline.

pub mod client;
pub mod extract;
pub mod pipeline;
pub mod plan;
pub mod prompt;
pub mod stream;

pub use client::{LlmClient, LlmRequest, LlmResponse};
pub use pipeline::{
    fallback_plan, DirectorPipeline, DirectorRunReport, PipelineConfig, PipelineHooks,
    PipelineInput, PipelineOutcome, StageProgress, StageState,
};
pub use plan::{DirectorResponse, Plan, PlanAction, PlanSection, Role, Section, StyleToken};
pub use prompt::DirectorRole;
pub use stream::{PlanAssembler, StreamProgress};
