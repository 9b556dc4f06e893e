//! Contracts for the external collaborators the agents delegate to
//!
//! Profiling, security assessment, semantic execution, LLM streaming and
//! chart rendering are all provided by the host application. The agents only
//! depend on these traits, so tests swap in mocks.

use super::classifier::QueryIntent;
use super::planner::{ExecutionPlan, VisualizationType};
use crate::types::{ChartOutput, DataProfile, SecurityPatch, UploadedFile};
use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// Profiles an uploaded CSV: schema inference and dataset statistics
#[async_trait]
pub trait CsvProfiler: Send + Sync {
    async fn profile(&self, file: &UploadedFile) -> Result<DataProfile>;
}

/// Assesses a fresh profile for PII exposure and produces a patch to merge
#[async_trait]
pub trait SecurityAssessor: Send + Sync {
    async fn assess(&self, profile: &DataProfile) -> Result<SecurityPatch>;
}

/// Request handed to the semantic execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRequest {
    pub intent: QueryIntent,
    pub profile: DataProfile,
    pub plan: ExecutionPlan,
}

/// Structured answer from the semantic execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticResponse {
    /// Result rows
    pub data: Vec<Value>,
    /// Derived insights, already phrased for the user
    #[serde(default)]
    pub insights: Vec<String>,
    /// Follow-up suggestions contributed by the engine
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Engine asks for an LLM pass over its output
    #[serde(default)]
    pub requires_llm_processing: bool,
}

/// Executes a plan against the profiled dataset
#[async_trait]
pub trait SemanticExecutor: Send + Sync {
    async fn execute(&self, request: SemanticRequest) -> Result<SemanticResponse>;
}

/// One chunk of a streamed LLM answer
#[derive(Debug, Clone)]
pub enum LlmChunk {
    /// Incremental response text
    Content(String),
    /// Structured payload emitted mid-stream (charts, tables)
    StructuredOutput(Value),
    /// Stream-level failure; terminates accumulation with an error
    Error(String),
}

pub type LlmStream = Pin<Box<dyn Stream<Item = LlmChunk> + Send>>;

/// Streaming LLM backend used for the llm_only path and hybrid enhancement
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream(
        &self,
        session_id: &str,
        query: &str,
        file_id: Option<&str>,
    ) -> Result<LlmStream>;
}

/// Renders result rows into a chart of the suggested kind
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(
        &self,
        data: &[Value],
        visualization: VisualizationType,
    ) -> Result<ChartOutput>;
}
