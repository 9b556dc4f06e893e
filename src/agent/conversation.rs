//! Conversation agent: session context, routing decisions, and LLM fallback
//!
//! Every query that cannot be answered purely by the semantic engine lands
//! here. The agent keeps bounded per-session context, decides between the
//! semantic, LLM and hybrid paths, and accumulates streamed LLM output into a
//! final answer.

use super::classifier::{IntentClassifier, IntentType};
use super::collaborators::{LlmChunk, LlmClient, LlmStream, SemanticExecutor, SemanticRequest};
use super::envelope::{Agent, AgentExecutionContext, AgentType};
use super::planner::QueryPlanner;
use crate::config::RoutingConfig;
use crate::types::{AnalysisResult, DataProfile, RoutingStrategy};
use crate::{log_debug, log_info, log_warn};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_HISTORY: usize = 10;
const MAX_ANALYSES: usize = 5;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn of the session transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn now(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Reference to a completed analysis, kept for follow-up suggestions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRef {
    pub query: String,
    pub strategy: RoutingStrategy,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Route to the semantic engine whenever the classification is usable
    #[serde(default)]
    pub prefer_semantic: bool,
}

/// Per-session conversation state. History and analysis references are
/// bounded; the oldest entries fall off.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub history: VecDeque<ChatMessage>,
    pub recent_analyses: VecDeque<AnalysisRef>,
    pub profile: Option<DataProfile>,
    pub preferences: UserPreferences,
}

impl ConversationContext {
    fn push_message(&mut self, message: ChatMessage) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    fn push_analysis(&mut self, analysis: AnalysisRef) {
        if self.recent_analyses.len() == MAX_ANALYSES {
            self.recent_analyses.pop_front();
        }
        self.recent_analyses.push_back(analysis);
    }
}

/// Explicit merge patch for session context. Absent fields leave the current
/// value in place.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub profile: Option<DataProfile>,
    pub preferences: Option<UserPreferences>,
}

impl ContextPatch {
    fn apply(self, target: &mut ConversationContext) {
        if let Some(profile) = self.profile {
            target.profile = Some(profile);
        }
        if let Some(preferences) = self.preferences {
            target.preferences = preferences;
        }
    }
}

/// Outcome of the routing decision, with the reasons that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: RoutingStrategy,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Classification state fed into the routing table
#[derive(Debug, Clone, Copy)]
enum PlanningOutcome {
    /// Usable plan with this classification confidence
    Planned(f64),
    /// Classification or planning fell back to the LLM path
    Failed,
}

/// Decide which execution path answers the query.
///
/// The table is ordered; the first matching row wins.
fn decide_route(
    routing: &RoutingConfig,
    has_data: bool,
    outcome: PlanningOutcome,
    prefer_semantic: bool,
) -> RoutingDecision {
    if !has_data {
        return RoutingDecision {
            strategy: RoutingStrategy::LlmOnly,
            confidence: 0.9,
            reasons: vec!["no dataset attached to this session".to_string()],
        };
    }
    let confidence = match outcome {
        PlanningOutcome::Failed => {
            return RoutingDecision {
                strategy: RoutingStrategy::LlmOnly,
                confidence: 0.8,
                reasons: vec!["query planning was not usable".to_string()],
            };
        }
        PlanningOutcome::Planned(confidence) => confidence,
    };
    if prefer_semantic && confidence > routing.hybrid_floor {
        return RoutingDecision {
            strategy: RoutingStrategy::SemanticOnly,
            confidence,
            reasons: vec!["user preference for semantic execution".to_string()],
        };
    }
    if confidence >= routing.semantic_threshold {
        RoutingDecision {
            strategy: RoutingStrategy::SemanticOnly,
            confidence,
            reasons: vec![format!("classification confidence {:.2}", confidence)],
        }
    } else if confidence >= routing.hybrid_floor {
        RoutingDecision {
            strategy: RoutingStrategy::Hybrid,
            confidence,
            reasons: vec![format!(
                "mid-range confidence {:.2}, semantic result enhanced by LLM",
                confidence
            )],
        }
    } else {
        RoutingDecision {
            strategy: RoutingStrategy::LlmOnly,
            confidence,
            reasons: vec![format!("low classification confidence {:.2}", confidence)],
        }
    }
}

/// Session-aware agent that routes queries and talks to the LLM backend
pub struct ConversationAgent {
    classifier: IntentClassifier,
    planner: QueryPlanner,
    semantic: Option<Arc<dyn SemanticExecutor>>,
    llm: Arc<dyn LlmClient>,
    routing: RoutingConfig,
    sessions: Mutex<HashMap<String, ConversationContext>>,
}

impl ConversationAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        semantic: Option<Arc<dyn SemanticExecutor>>,
        routing: RoutingConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            planner: QueryPlanner::new(),
            semantic,
            llm,
            routing,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Merge a context patch into the named session, creating it if new
    pub async fn update_context(&self, session_id: &str, patch: ContextPatch) {
        let mut sessions = self.sessions.lock().await;
        let context = sessions.entry(session_id.to_string()).or_default();
        patch.apply(context);
    }

    /// Snapshot of a session's context, for inspection
    pub async fn context(&self, session_id: &str) -> Option<ConversationContext> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Answer one query in the named session
    pub async fn handle_query(&self, session_id: &str, query: &str) -> Result<AnalysisResult> {
        let (profile, prefer_semantic) = {
            let mut sessions = self.sessions.lock().await;
            let context = sessions.entry(session_id.to_string()).or_default();
            context.push_message(ChatMessage::now(MessageRole::User, query));
            (context.profile.clone(), context.preferences.prefer_semantic)
        };

        let planned = profile.as_ref().map(|profile| {
            let classification = self
                .classifier
                .classify(query, &profile.schema.column_names());
            let plan = self.planner.plan(&classification.intent, profile);
            (classification.intent, plan)
        });

        // Only an unclassifiable query counts as failed planning; a
        // low-confidence plan still routes through the table below.
        let outcome = match &planned {
            None => PlanningOutcome::Failed,
            Some((intent, _)) if intent.intent_type == IntentType::Unknown => {
                PlanningOutcome::Failed
            }
            Some((intent, _)) => PlanningOutcome::Planned(intent.confidence),
        };

        let decision = decide_route(&self.routing, profile.is_some(), outcome, prefer_semantic);
        log_info!(
            "session {} routed to {} (confidence {:.2})",
            session_id,
            decision.strategy,
            decision.confidence
        );

        let mut result = match decision.strategy {
            RoutingStrategy::LlmOnly => {
                self.answer_with_llm(session_id, query, profile.as_ref())
                    .await?
            }
            RoutingStrategy::SemanticOnly | RoutingStrategy::Hybrid => {
                match self
                    .answer_with_semantic(session_id, query, &decision, planned, profile.as_ref())
                    .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        // Semantic failures degrade to the LLM path rather
                        // than surfacing to the caller
                        log_warn!("semantic path failed, degrading to llm: {}", err);
                        self.answer_with_llm(session_id, query, profile.as_ref())
                            .await?
                    }
                }
            }
        };

        result.suggestions = self.build_suggestions(session_id, profile.as_ref()).await;

        let mut sessions = self.sessions.lock().await;
        if let Some(context) = sessions.get_mut(session_id) {
            context.push_message(ChatMessage::now(MessageRole::Assistant, &result.response));
            // A pure LLM turn with no insights produced no analysis worth
            // referencing in follow-ups
            if result.strategy != RoutingStrategy::LlmOnly || !result.insights.is_empty() {
                context.push_analysis(AnalysisRef {
                    query: query.to_string(),
                    strategy: result.strategy,
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(result)
    }

    async fn answer_with_semantic(
        &self,
        session_id: &str,
        query: &str,
        decision: &RoutingDecision,
        planned: Option<(super::classifier::QueryIntent, super::planner::ExecutionPlan)>,
        profile: Option<&DataProfile>,
    ) -> Result<AnalysisResult> {
        let executor = self
            .semantic
            .as_ref()
            .context("no semantic executor configured")?;
        let (intent, plan) = planned.context("no plan available for semantic execution")?;
        let profile = profile.context("no profile available for semantic execution")?;

        let response = executor
            .execute(SemanticRequest {
                intent,
                profile: profile.clone(),
                plan,
            })
            .await?;

        let summary = if response.insights.is_empty() {
            format!("Computed {} result rows.", response.data.len())
        } else {
            response.insights.join(" ")
        };

        // The executor can hand back rows it could not narrate itself; that
        // forces the LLM pass even on a semantic-only route
        let needs_enhancement =
            decision.strategy == RoutingStrategy::Hybrid || response.requires_llm_processing;

        let mut result = AnalysisResult {
            response: summary,
            data: response.data,
            insights: response.insights,
            chart: None,
            strategy: if needs_enhancement {
                RoutingStrategy::Hybrid
            } else {
                decision.strategy
            },
            suggestions: response.suggestions,
        };

        if needs_enhancement {
            // LLM enhancement is best effort: on failure the semantic answer
            // is returned unchanged
            match self
                .llm
                .stream(session_id, query, Some(profile.id.as_str()))
                .await
            {
                Ok(stream) => match accumulate_stream(stream).await {
                    Ok((text, _)) if !text.is_empty() => {
                        result.response = text;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log_debug!("hybrid enhancement failed, keeping semantic answer: {}", err)
                    }
                },
                Err(err) => {
                    log_debug!("hybrid enhancement unavailable: {}", err);
                }
            }
        }
        Ok(result)
    }

    async fn answer_with_llm(
        &self,
        session_id: &str,
        query: &str,
        profile: Option<&DataProfile>,
    ) -> Result<AnalysisResult> {
        let file_id = profile.map(|p| p.id.as_str());
        let stream = self.llm.stream(session_id, query, file_id).await?;
        let (text, structured) = accumulate_stream(stream).await?;

        let mut result = AnalysisResult::llm_text(text);
        result.data = structured;
        Ok(result)
    }

    /// Up to three follow-up suggestions from the schema and recent analyses
    async fn build_suggestions(
        &self,
        session_id: &str,
        profile: Option<&DataProfile>,
    ) -> Vec<String> {
        let mut suggestions = Vec::new();
        if let Some(profile) = profile {
            for column in profile.schema.column_names() {
                if suggestions.len() >= MAX_SUGGESTIONS - 1 {
                    break;
                }
                suggestions.push(format!("What is the distribution of {}?", column));
            }
        }
        let sessions = self.sessions.lock().await;
        if let Some(context) = sessions.get(session_id) {
            if let Some(last) = context.recent_analyses.back() {
                if last.strategy == RoutingStrategy::SemanticOnly
                    && suggestions.len() < MAX_SUGGESTIONS
                {
                    suggestions.push(format!("Show a chart for \"{}\"", last.query));
                }
            }
        }
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }
}

/// Drain a stream into (answer text, structured payloads).
///
/// An `Error` chunk aborts accumulation and is the only failure that
/// propagates out of a completed routing decision.
async fn accumulate_stream(mut stream: LlmStream) -> Result<(String, Vec<Value>)> {
    let mut text = String::new();
    let mut structured = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            LlmChunk::Content(piece) => text.push_str(&piece),
            LlmChunk::StructuredOutput(value) => structured.push(value),
            LlmChunk::Error(message) => anyhow::bail!("llm stream error: {}", message),
        }
    }
    Ok((text, structured))
}

/// Input accepted by the conversation agent on the registry path
#[derive(Debug, Deserialize)]
struct ConversationInput {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[async_trait]
impl Agent for ConversationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Conversation
    }

    fn validate_input(&self, input: &Value) -> Result<(), String> {
        match input.get("query").and_then(Value::as_str) {
            Some(q) if !q.trim().is_empty() => Ok(()),
            Some(_) => Err("empty query".to_string()),
            None => Err("missing query string".to_string()),
        }
    }

    async fn execute_internal(&self, input: Value, ctx: &AgentExecutionContext) -> Result<Value> {
        let input: ConversationInput =
            serde_json::from_value(input).context("malformed conversation payload")?;
        let session_id = input
            .session_id
            .or_else(|| ctx.session_id.clone())
            .unwrap_or_else(|| ctx.request_id.to_string());
        let result = self.handle_query(&session_id, &input.query).await?;
        Ok(serde_json::to_value(result)?)
    }
}
