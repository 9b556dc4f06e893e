//! Agent execution envelope
//!
//! Every agent runs inside an envelope that validates its input, races the work
//! against a per-request timeout, records health counters, and supports bounded
//! retries with exponential backoff. The envelope never returns `Err`: all
//! outcomes travel inside an `AgentResult`.

use super::error::AgentError;
use super::resources::process_memory_bytes;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Types of agents known to the orchestrator. One instance per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Profiler,
    Security,
    Planner,
    SemanticExecutor,
    Chart,
    Conversation,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profiler => write!(f, "profiler"),
            Self::Security => write!(f, "security"),
            Self::Planner => write!(f, "planner"),
            Self::SemanticExecutor => write!(f, "semantic_executor"),
            Self::Chart => write!(f, "chart"),
            Self::Conversation => write!(f, "conversation"),
        }
    }
}

/// Per-invocation context owned by the caller and passed into the envelope.
/// Immutable for the lifetime of the invocation.
#[derive(Debug, Clone)]
pub struct AgentExecutionContext {
    pub request_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub timeout_ms: u64,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl AgentExecutionContext {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            start_time: Utc::now(),
            timeout_ms,
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Measurements recorded for a single execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    pub memory_used_bytes: i64,
    pub cache_hit: bool,
}

/// Outcome of a single agent execution. Produced once, never mutated.
#[derive(Debug)]
pub struct AgentResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<AgentError>,
    pub metrics: ExecutionMetrics,
}

impl<T> AgentResult<T> {
    pub fn ok(data: T, metrics: ExecutionMetrics) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metrics,
        }
    }

    pub fn fail(error: AgentError, metrics: ExecutionMetrics) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metrics,
        }
    }

    /// Convert into a plain `Result`, for callers that treat failure as fatal
    pub fn into_result(self) -> Result<T, AgentError> {
        match (self.data, self.error) {
            (Some(data), _) if self.success => Ok(data),
            (_, Some(error)) => Err(error),
            _ => Err(AgentError::Execution {
                agent: AgentType::Conversation,
                source: anyhow::anyhow!("agent result carried neither data nor error"),
            }),
        }
    }
}

/// Cumulative health counters for one agent instance.
///
/// Mutated only by that agent's envelope; never reset except on process
/// restart.
#[derive(Debug, Default)]
pub struct AgentHealth {
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    error_count: AtomicU64,
    total_execution_time_ms: AtomicU64,
}

impl AgentHealth {
    fn record(&self, elapsed_ms: u64, success: bool) {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        self.total_execution_time_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        if success {
            self.successful_executions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot computed on demand
    pub fn status(&self) -> AgentHealthStatus {
        let total = self.total_executions.load(Ordering::Relaxed);
        let successful = self.successful_executions.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let total_time = self.total_execution_time_ms.load(Ordering::Relaxed);

        // With zero executions the agent is considered fully healthy
        let success_rate = if total == 0 {
            1.0
        } else {
            successful as f64 / total as f64
        };

        AgentHealthStatus {
            total_executions: total,
            successful_executions: successful,
            error_count: errors,
            total_execution_time_ms: total_time,
            avg_execution_time_ms: if total == 0 {
                0.0
            } else {
                total_time as f64 / total as f64
            },
            success_rate,
            healthy: success_rate > 0.95 && errors < 10,
        }
    }
}

/// Point-in-time health snapshot, readable by orchestrator health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthStatus {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub error_count: u64,
    pub total_execution_time_ms: u64,
    pub avg_execution_time_ms: f64,
    pub success_rate: f64,
    pub healthy: bool,
}

/// An agent as seen by the envelope and the orchestrator registry.
///
/// Inputs and outputs are JSON values so heterogeneous agents can share one
/// registry; concrete agents parse into their own typed requests.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;

    /// Cheap synchronous input check, run before any timing starts.
    /// Returns the rejection reason on failure.
    fn validate_input(&self, _input: &Value) -> Result<(), String> {
        Ok(())
    }

    async fn execute_internal(
        &self,
        input: Value,
        ctx: &AgentExecutionContext,
    ) -> Result<Value>;

    /// Release any resources held by the agent. Called on unregistration
    /// and at shutdown.
    async fn dispose(&self) {}
}

/// Wraps an agent with validation, timeout racing, and health accounting
pub struct AgentEnvelope {
    agent: Arc<dyn Agent>,
    health: AgentHealth,
}

impl AgentEnvelope {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            health: AgentHealth::default(),
        }
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent.agent_type()
    }

    pub fn health(&self) -> AgentHealthStatus {
        self.health.status()
    }

    /// Execute the wrapped agent with the context's timeout.
    ///
    /// The agent's work is spawned and raced against a timer; whichever
    /// settles first wins. The losing task is detached, not cancelled, and its
    /// result is discarded. Every raced outcome updates the health counters
    /// exactly once.
    pub async fn execute(&self, input: Value, ctx: &AgentExecutionContext) -> AgentResult<Value> {
        let agent_type = self.agent.agent_type();

        // Validation happens before timing starts and does not count as an
        // execution: the work never ran.
        if let Err(reason) = self.agent.validate_input(&input) {
            return AgentResult::fail(
                AgentError::InvalidInput {
                    agent: agent_type,
                    reason,
                },
                ExecutionMetrics::default(),
            );
        }

        let started = Instant::now();
        let memory_before = process_memory_bytes();

        let agent = Arc::clone(&self.agent);
        let task_ctx = ctx.clone();
        let mut handle = tokio::spawn(async move { agent.execute_internal(input, &task_ctx).await });

        let raced = tokio::select! {
            joined = &mut handle => Some(joined),
            _ = tokio::time::sleep(Duration::from_millis(ctx.timeout_ms)) => None,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let memory_delta = process_memory_bytes() as i64 - memory_before as i64;

        match raced {
            None => {
                // Timer won; `handle` is dropped without aborting, so the
                // in-flight work keeps running detached and its result is
                // discarded. Known leak risk under sustained timeouts.
                self.health.record(elapsed_ms, false);
                AgentResult::fail(
                    AgentError::Timeout {
                        agent: agent_type,
                        timeout_ms: ctx.timeout_ms,
                    },
                    ExecutionMetrics {
                        execution_time_ms: elapsed_ms,
                        memory_used_bytes: memory_delta,
                        cache_hit: false,
                    },
                )
            }
            Some(Ok(Ok(output))) => {
                self.health.record(elapsed_ms, true);
                let cache_hit = output
                    .get("cache_hit")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                AgentResult::ok(
                    output,
                    ExecutionMetrics {
                        execution_time_ms: elapsed_ms,
                        memory_used_bytes: memory_delta,
                        cache_hit,
                    },
                )
            }
            Some(Ok(Err(err))) => {
                self.health.record(elapsed_ms, false);
                AgentResult::fail(
                    AgentError::Execution {
                        agent: agent_type,
                        source: err,
                    },
                    ExecutionMetrics {
                        execution_time_ms: elapsed_ms,
                        memory_used_bytes: memory_delta,
                        cache_hit: false,
                    },
                )
            }
            Some(Err(join_err)) => {
                self.health.record(elapsed_ms, false);
                AgentResult::fail(
                    AgentError::Execution {
                        agent: agent_type,
                        source: anyhow::anyhow!("agent task panicked: {join_err}"),
                    },
                    ExecutionMetrics {
                        execution_time_ms: elapsed_ms,
                        memory_used_bytes: memory_delta,
                        cache_hit: false,
                    },
                )
            }
        }
    }

    /// Re-invoke `execute` up to `max_retries` additional times with
    /// exponential backoff (`backoff_ms * 2^attempt` between attempts).
    /// Returns the first success or the last failure. `InvalidInput` is
    /// never retried.
    pub async fn retry_execution(
        &self,
        input: Value,
        ctx: &AgentExecutionContext,
        max_retries: usize,
        backoff_ms: u64,
    ) -> AgentResult<Value> {
        let mut attempt = 0;
        loop {
            let result = self.execute(input.clone(), ctx).await;
            if result.success {
                return result;
            }
            let retryable = result
                .error
                .as_ref()
                .map(|e| e.is_retryable())
                .unwrap_or(false);
            if !retryable || attempt >= max_retries {
                return result;
            }
            let delay = backoff_ms.saturating_mul(1u64 << attempt.min(16));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    pub async fn dispose(&self) {
        self.agent.dispose().await;
    }
}
