//! Agent implementations registered with the orchestrator
//!
//! Each agent adapts one collaborator (or, for the planner, the in-process
//! classifier and planner) to the JSON-in/JSON-out `Agent` trait so the
//! envelope and registry stay type-agnostic.

use super::classifier::{IntentClassifier, RankedIntent};
use super::collaborators::{
    ChartRenderer, CsvProfiler, SecurityAssessor, SemanticExecutor, SemanticRequest,
};
use super::envelope::{Agent, AgentExecutionContext, AgentType};
use super::plan_cache::PlanCache;
use super::planner::{ExecutionPlan, QueryPlanner, VisualizationType};
use crate::log_debug;
use crate::types::{DataProfile, UploadedFile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Wraps the CSV profiling collaborator
pub struct ProfilingAgent {
    profiler: Arc<dyn CsvProfiler>,
}

impl ProfilingAgent {
    pub fn new(profiler: Arc<dyn CsvProfiler>) -> Self {
        Self { profiler }
    }
}

#[async_trait]
impl Agent for ProfilingAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Profiler
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        if input.get("name").and_then(Value::as_str).is_none() {
            return Err("missing file name".to_string());
        }
        Ok(())
    }

    async fn execute_internal(&self, input: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let file: UploadedFile =
            serde_json::from_value(input).context("malformed uploaded file payload")?;
        let profile = self.profiler.profile(&file).await?;
        Ok(serde_json::to_value(profile)?)
    }
}

/// Wraps the security assessment collaborator
pub struct SecurityAgent {
    assessor: Arc<dyn SecurityAssessor>,
}

impl SecurityAgent {
    pub fn new(assessor: Arc<dyn SecurityAssessor>) -> Self {
        Self { assessor }
    }
}

#[async_trait]
impl Agent for SecurityAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Security
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        if input.get("schema").is_none() {
            return Err("missing profile schema".to_string());
        }
        Ok(())
    }

    async fn execute_internal(&self, input: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let profile: DataProfile =
            serde_json::from_value(input).context("malformed data profile payload")?;
        let patch = self.assessor.assess(&profile).await?;
        Ok(serde_json::to_value(patch)?)
    }
}

/// Input accepted by the planner agent
#[derive(Debug, Deserialize)]
struct PlannerInput {
    query: String,
    profile: DataProfile,
}

/// Output of the planner agent. `cache_hit` stays at the top level so the
/// envelope can lift it into the execution metrics.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub intent: super::classifier::QueryIntent,
    pub ranked: Vec<RankedIntent>,
    pub plan: ExecutionPlan,
    pub cache_hit: bool,
}

/// Classifies the query and produces an execution plan, consulting the plan
/// cache for repeat semantic shapes.
pub struct PlannerAgent {
    classifier: IntentClassifier,
    planner: QueryPlanner,
    cache: Mutex<PlanCache>,
}

impl Default for PlannerAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerAgent {
    pub fn new() -> Self {
        Self {
            classifier: IntentClassifier::new(),
            planner: QueryPlanner::new(),
            cache: Mutex::new(PlanCache::new()),
        }
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Planner
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        if input.get("query").and_then(Value::as_str).is_none() {
            return Err("missing query string".to_string());
        }
        if input.get("profile").map(Value::is_object) != Some(true) {
            return Err("missing data profile".to_string());
        }
        Ok(())
    }

    async fn execute_internal(&self, input: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let request: PlannerInput =
            serde_json::from_value(input).context("malformed planner payload")?;
        let columns = request.profile.schema.column_names();

        let classification = self.classifier.classify(&request.query, &columns);
        let intent = classification.intent;

        let fresh = self.planner.plan(&intent, &request.profile);
        let mut cache_hit = false;
        let plan = if let Some(key) = fresh.cache_key.clone() {
            let mut cache = self.cache.lock().await;
            match cache.get(&key) {
                Some(cached) => {
                    cache_hit = true;
                    log_debug!("plan cache hit for key {}", key);
                    cached
                }
                None => {
                    cache.insert(&fresh);
                    fresh
                }
            }
        } else {
            fresh
        };

        let output = PlannerOutput {
            intent,
            ranked: classification.ranked,
            plan,
            cache_hit,
        };
        Ok(serde_json::to_value(output)?)
    }
}

/// Input accepted by the semantic agent
#[derive(Debug, Deserialize)]
struct SemanticInput {
    #[serde(flatten)]
    request: SemanticRequest,
}

/// Wraps the semantic execution engine
pub struct SemanticAgent {
    executor: Arc<dyn SemanticExecutor>,
}

impl SemanticAgent {
    pub fn new(executor: Arc<dyn SemanticExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Agent for SemanticAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::SemanticExecutor
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        if input.get("intent").is_none() || input.get("plan").is_none() {
            return Err("missing intent or plan".to_string());
        }
        Ok(())
    }

    async fn execute_internal(&self, input: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let input: SemanticInput =
            serde_json::from_value(input).context("malformed semantic payload")?;
        let response = self.executor.execute(input.request).await?;
        Ok(serde_json::to_value(response)?)
    }
}

/// Input accepted by the chart agent
#[derive(Debug, Deserialize)]
struct ChartInput {
    data: Vec<Value>,
    visualization: VisualizationType,
}

/// Wraps the chart rendering collaborator
pub struct ChartAgent {
    renderer: Arc<dyn ChartRenderer>,
}

impl ChartAgent {
    pub fn new(renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Agent for ChartAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Chart
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        match input.get("data").and_then(Value::as_array) {
            Some(rows) if !rows.is_empty() => Ok(()),
            Some(_) => Err("no rows to chart".to_string()),
            None => Err("missing data rows".to_string()),
        }
    }

    async fn execute_internal(&self, input: Value, _ctx: &AgentExecutionContext) -> Result<Value> {
        let input: ChartInput =
            serde_json::from_value(input).context("malformed chart payload")?;
        let chart = self.renderer.render(&input.data, input.visualization).await?;
        Ok(serde_json::to_value(chart)?)
    }
}
