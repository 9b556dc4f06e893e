//! Agent orchestrator: registry, upload pipeline, and query execution
//!
//! Owns one envelope per agent type plus the profile store. Uploads flow
//! profiler -> security -> store; queries flow planner -> semantic engine,
//! with the conversation agent as the fallback for everything the semantic
//! path cannot answer.

use super::agents::PlannerOutput;
use super::collaborators::{SemanticRequest, SemanticResponse};
use super::conversation::{ContextPatch, ConversationAgent};
use super::envelope::{
    Agent, AgentEnvelope, AgentExecutionContext, AgentHealthStatus, AgentType,
};
use super::error::AgentError;
use super::planner::VisualizationType;
use super::resources::{self, AgentCounts, ResourceStatus};
use crate::config::AppConfig;
use crate::types::{
    AnalysisResult, ChartOutput, DataProfile, RoutingStrategy, SecurityPatch, UploadedFile,
};
use crate::{log_error, log_info, log_warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Central coordinator for all registered agents
pub struct AgentOrchestrator {
    config: AppConfig,
    agents: RwLock<HashMap<AgentType, Arc<AgentEnvelope>>>,
    profiles: RwLock<HashMap<String, DataProfile>>,
    /// Typed handle kept alongside the registry entry so session context can
    /// be patched after uploads
    conversation: RwLock<Option<Arc<ConversationAgent>>>,
}

impl AgentOrchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            agents: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            conversation: RwLock::new(None),
        }
    }

    /// Register an agent. At most one agent per type.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<(), AgentError> {
        let agent_type = agent.agent_type();
        let mut agents = self.agents.write().await;
        if agents.contains_key(&agent_type) {
            return Err(AgentError::DuplicateAgent(agent_type));
        }
        log_info!("registered {} agent", agent_type);
        agents.insert(agent_type, Arc::new(AgentEnvelope::new(agent)));
        Ok(())
    }

    /// Register the conversation agent, keeping a typed handle for context
    /// patches in addition to the registry entry
    pub async fn register_conversation_agent(
        &self,
        agent: Arc<ConversationAgent>,
    ) -> Result<(), AgentError> {
        self.register_agent(agent.clone()).await?;
        *self.conversation.write().await = Some(agent);
        Ok(())
    }

    /// Dispose and remove the agent of the given type
    pub async fn unregister_agent(&self, agent_type: AgentType) -> Result<(), AgentError> {
        let removed = self.agents.write().await.remove(&agent_type);
        match removed {
            Some(envelope) => {
                envelope.dispose().await;
                if agent_type == AgentType::Conversation {
                    *self.conversation.write().await = None;
                }
                log_info!("unregistered {} agent", agent_type);
                Ok(())
            }
            None => Err(AgentError::AgentNotFound(agent_type)),
        }
    }

    async fn envelope(&self, agent_type: AgentType) -> Result<Arc<AgentEnvelope>, AgentError> {
        self.agents
            .read()
            .await
            .get(&agent_type)
            .cloned()
            .ok_or(AgentError::AgentNotFound(agent_type))
    }

    fn execution_context(&self, session_id: Option<&str>) -> AgentExecutionContext {
        let ctx = AgentExecutionContext::new(self.config.agent.timeout_ms);
        match session_id {
            Some(session_id) => ctx.with_session(session_id),
            None => ctx,
        }
    }

    /// Validate, profile, and security-assess an uploaded file.
    ///
    /// Validation failures reject synchronously before any agent runs. A
    /// security assessment failure is logged and swallowed: the profile is
    /// stored without a security section.
    pub async fn process_data_upload(
        &self,
        file: UploadedFile,
    ) -> Result<DataProfile, AgentError> {
        self.validate_upload(&file)?;

        let profiler = self.envelope(AgentType::Profiler).await?;
        let ctx = self.execution_context(None);
        let input = serde_json::to_value(&file).map_err(|e| AgentError::Execution {
            agent: AgentType::Profiler,
            source: e.into(),
        })?;

        let result = profiler
            .retry_execution(
                input,
                &ctx,
                self.config.agent.max_retries,
                self.config.agent.retry_backoff_ms,
            )
            .await;
        let raw = result.into_result()?;
        let mut profile: DataProfile =
            serde_json::from_value(raw).map_err(|e| AgentError::Execution {
                agent: AgentType::Profiler,
                source: e.into(),
            })?;
        if profile.id.is_empty() {
            profile.id = Uuid::new_v4().to_string();
        }

        self.assess_security(&mut profile).await;

        log_info!(
            "profiled upload {} as {} ({} rows, {} columns)",
            file.name,
            profile.id,
            profile.metadata.row_count,
            profile.metadata.column_count
        );

        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());

        // Attach the profile to the matching conversation session so
        // follow-up questions route against it
        if let Some(conversation) = self.conversation.read().await.as_ref() {
            conversation
                .update_context(
                    &profile.id,
                    ContextPatch {
                        profile: Some(profile.clone()),
                        ..Default::default()
                    },
                )
                .await;
        }

        Ok(profile)
    }

    fn validate_upload(&self, file: &UploadedFile) -> Result<(), AgentError> {
        if file.bytes.is_empty() {
            return Err(AgentError::UploadRejected("file is empty".to_string()));
        }
        if file.size() > self.config.upload.max_file_bytes {
            return Err(AgentError::UploadRejected(format!(
                "file size {} exceeds limit of {} bytes",
                file.size(),
                self.config.upload.max_file_bytes
            )));
        }
        match file.extension() {
            Some(ext) if self.config.upload.allowed_extensions.contains(&ext) => Ok(()),
            Some(ext) => Err(AgentError::UploadRejected(format!(
                "unsupported file extension: {}",
                ext
            ))),
            None => Err(AgentError::UploadRejected(
                "file has no extension".to_string(),
            )),
        }
    }

    /// Best-effort security pass over a fresh profile
    async fn assess_security(&self, profile: &mut DataProfile) {
        let envelope = match self.envelope(AgentType::Security).await {
            Ok(envelope) => envelope,
            Err(_) => return,
        };
        let input = match serde_json::to_value(&*profile) {
            Ok(input) => input,
            Err(_) => return,
        };
        let ctx = self.execution_context(None);
        let result = envelope.execute(input, &ctx).await;
        match result.into_result() {
            Ok(raw) => match serde_json::from_value::<SecurityPatch>(raw) {
                Ok(patch) => profile.apply_security(&patch),
                Err(e) => log_warn!("security patch was malformed, skipping: {}", e),
            },
            Err(e) => self.handle_agent_failure(AgentType::Security, &e).await,
        }
    }

    /// Answer a query against a previously uploaded dataset.
    ///
    /// Planner and semantic failures both degrade to the conversation agent;
    /// only a conversation failure surfaces to the caller.
    pub async fn execute_query(
        &self,
        query: &str,
        profile_id: &str,
    ) -> Result<AnalysisResult, AgentError> {
        let profile = self.profiles.read().await.get(profile_id).cloned();
        let profile = match profile {
            Some(profile) => profile,
            None => {
                log_warn!("query against unknown profile {}", profile_id);
                return self.converse(query, profile_id).await;
            }
        };

        let planned = match self.plan_query(query, &profile).await {
            Ok(planned) => planned,
            Err(e) => {
                self.handle_agent_failure(AgentType::Planner, &e).await;
                return self.converse(query, profile_id).await;
            }
        };

        if planned.plan.fallback_to_llm
            || planned.intent.confidence < self.config.routing.planner_floor
        {
            return self.converse(query, profile_id).await;
        }

        let visualization = planned.plan.suggested_visualization;
        let response = match self.run_semantic(&planned, &profile).await {
            Ok(response) if !response.requires_llm_processing => response,
            Ok(_) => return self.converse(query, profile_id).await,
            Err(e) => {
                self.handle_agent_failure(AgentType::SemanticExecutor, &e)
                    .await;
                return self.converse(query, profile_id).await;
            }
        };

        let chart = self.render_chart(&response.data, visualization).await;
        let summary = if response.insights.is_empty() {
            format!("Computed {} result rows.", response.data.len())
        } else {
            response.insights.join(" ")
        };

        Ok(AnalysisResult {
            response: summary,
            data: response.data,
            insights: response.insights,
            chart,
            strategy: RoutingStrategy::SemanticOnly,
            suggestions: response.suggestions,
        })
    }

    async fn plan_query(
        &self,
        query: &str,
        profile: &DataProfile,
    ) -> Result<PlannerOutput, AgentError> {
        let envelope = self.envelope(AgentType::Planner).await?;
        let ctx = self.execution_context(Some(&profile.id));
        let input = json!({ "query": query, "profile": profile });
        let raw = envelope.execute(input, &ctx).await.into_result()?;
        serde_json::from_value(raw).map_err(|e| AgentError::Execution {
            agent: AgentType::Planner,
            source: e.into(),
        })
    }

    async fn run_semantic(
        &self,
        planned: &PlannerOutput,
        profile: &DataProfile,
    ) -> Result<SemanticResponse, AgentError> {
        let envelope = self.envelope(AgentType::SemanticExecutor).await?;
        let ctx = self.execution_context(Some(&profile.id));
        let request = SemanticRequest {
            intent: planned.intent.clone(),
            profile: profile.clone(),
            plan: planned.plan.clone(),
        };
        let input = serde_json::to_value(&request).map_err(|e| AgentError::Execution {
            agent: AgentType::SemanticExecutor,
            source: e.into(),
        })?;
        let raw = envelope.execute(input, &ctx).await.into_result()?;
        serde_json::from_value(raw).map_err(|e| AgentError::Execution {
            agent: AgentType::SemanticExecutor,
            source: e.into(),
        })
    }

    /// Best-effort chart rendering; any failure leaves the answer chartless
    async fn render_chart(
        &self,
        data: &[Value],
        visualization: VisualizationType,
    ) -> Option<ChartOutput> {
        if visualization == VisualizationType::Table || data.is_empty() {
            return None;
        }
        let envelope = self.envelope(AgentType::Chart).await.ok()?;
        let ctx = self.execution_context(None);
        let input = json!({ "data": data, "visualization": visualization });
        match envelope.execute(input, &ctx).await.into_result() {
            Ok(raw) => serde_json::from_value(raw).ok(),
            Err(e) => {
                self.handle_agent_failure(AgentType::Chart, &e).await;
                None
            }
        }
    }

    /// Route a query through the conversation agent, keyed by the profile id
    /// so the dataset's session context applies
    async fn converse(&self, query: &str, profile_id: &str) -> Result<AnalysisResult, AgentError> {
        let envelope = self.envelope(AgentType::Conversation).await?;
        let ctx = self.execution_context(Some(profile_id));
        let input = json!({ "query": query, "session_id": profile_id });
        let raw = envelope.execute(input, &ctx).await.into_result()?;
        serde_json::from_value(raw).map_err(|e| AgentError::Execution {
            agent: AgentType::Conversation,
            source: e.into(),
        })
    }

    /// Log a failure alongside the agent's current health snapshot
    pub async fn handle_agent_failure(&self, agent_type: AgentType, error: &AgentError) {
        let health = self
            .agents
            .read()
            .await
            .get(&agent_type)
            .map(|envelope| envelope.health());
        match health {
            Some(health) => log_error!(
                "{} agent failed: {} (success rate {:.2}, {} errors)",
                agent_type,
                error,
                health.success_rate,
                health.error_count
            ),
            None => log_error!("{} agent failed: {}", agent_type, error),
        }
    }

    /// Health snapshot per registered agent
    pub async fn get_system_health(&self) -> HashMap<AgentType, AgentHealthStatus> {
        self.agents
            .read()
            .await
            .iter()
            .map(|(agent_type, envelope)| (*agent_type, envelope.health()))
            .collect()
    }

    /// Point-in-time resource snapshot for admission decisions by the caller
    pub async fn check_resource_limits(&self) -> ResourceStatus {
        let agents = self.agents.read().await;
        let failed = agents
            .values()
            .filter(|envelope| !envelope.health().healthy)
            .count();
        ResourceStatus {
            memory_bytes: resources::process_memory_bytes(),
            cpu_percent: resources::process_cpu_percent(),
            agents: AgentCounts {
                active: agents.len(),
                queued: 0,
                failed,
            },
        }
    }

    /// Stored profile lookup
    pub async fn get_profile(&self, profile_id: &str) -> Option<DataProfile> {
        self.profiles.read().await.get(profile_id).cloned()
    }

    /// Dispose every agent and clear the registry
    pub async fn shutdown(&self) {
        let mut agents = self.agents.write().await;
        for (agent_type, envelope) in agents.drain() {
            log_info!("disposing {} agent", agent_type);
            envelope.dispose().await;
        }
        *self.conversation.write().await = None;
    }
}
