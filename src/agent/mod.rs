//! Módulo de Agentes - Sistema de orquestación de consultas
//!
//! Este módulo implementa la orquestación de agentes sobre datasets CSV,
//! incluyendo clasificación de intención, planificación de consultas y
//! routing entre el motor semántico y el LLM.
//!
//! # Componentes Principales
//!
//! - [`orchestrator::AgentOrchestrator`] - Registro de agentes y pipeline de consultas
//! - [`classifier`] - Clasificación de intención basada en patrones
//! - [`planner`] - Planificación de ejecución con estimación de costos
//! - [`conversation`] - Agente conversacional con routing y fallback LLM
//! - [`envelope`] - Envoltura de ejecución con timeout, reintentos y salud

pub mod agents;
pub mod classifier;
pub mod collaborators;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod plan_cache;
pub mod planner;
pub mod resources;

pub use agents::{ChartAgent, PlannerAgent, PlannerOutput, ProfilingAgent, SecurityAgent, SemanticAgent};
pub use classifier::{Classification, IntentClassifier, IntentType, QueryEntity, QueryIntent};
pub use collaborators::{
    ChartRenderer, CsvProfiler, LlmChunk, LlmClient, LlmStream, SecurityAssessor,
    SemanticExecutor, SemanticRequest, SemanticResponse,
};
pub use conversation::{ContextPatch, ConversationAgent, RoutingDecision, UserPreferences};
pub use envelope::{
    Agent, AgentEnvelope, AgentExecutionContext, AgentHealthStatus, AgentResult, AgentType,
    ExecutionMetrics,
};
pub use error::AgentError;
pub use orchestrator::AgentOrchestrator;
pub use plan_cache::{PlanCache, PlanCacheStats};
pub use planner::{ExecutionPlan, Optimization, PlanStep, QueryPlanner, StepType, VisualizationType};
pub use resources::{AgentCounts, ResourceStatus};
