//! Error taxonomy for agent execution and orchestration

use super::envelope::AgentType;
use thiserror::Error;

/// Errors surfaced by the execution envelope and the orchestrator.
///
/// The envelope never propagates these as `Err`; they travel inside a failed
/// `AgentResult`. The orchestrator decides per error whether to fall back
/// (planner failure → conversation agent) or surface the failure.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Input failed the agent's validation; never retried
    #[error("invalid input for {agent} agent: {reason}")]
    InvalidInput { agent: AgentType, reason: String },

    /// No agent registered for the requested type
    #[error("no agent registered for type {0}")]
    AgentNotFound(AgentType),

    /// A second registration was attempted for an already-registered type
    #[error("agent type {0} is already registered")]
    DuplicateAgent(AgentType),

    /// The agent's work lost the race against the configured timeout
    #[error("{agent} agent timed out after {timeout_ms}ms")]
    Timeout { agent: AgentType, timeout_ms: u64 },

    /// The agent's work completed with an error
    #[error("{agent} agent execution failed: {source}")]
    Execution {
        agent: AgentType,
        #[source]
        source: anyhow::Error,
    },

    /// Synchronous upload validation failure; not an agent error
    #[error("upload rejected: {0}")]
    UploadRejected(String),
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }

    /// Whether caller retry policy may re-attempt after this error.
    /// Validation and registry errors are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout { .. } | AgentError::Execution { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        let timeout = AgentError::Timeout {
            agent: AgentType::Planner,
            timeout_ms: 100,
        };
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());

        let invalid = AgentError::InvalidInput {
            agent: AgentType::Planner,
            reason: "missing query".to_string(),
        };
        assert!(!invalid.is_retryable());

        let duplicate = AgentError::DuplicateAgent(AgentType::Chart);
        assert!(!duplicate.is_retryable());
    }

    #[test]
    fn test_display_includes_agent_type() {
        let err = AgentError::Timeout {
            agent: AgentType::SemanticExecutor,
            timeout_ms: 250,
        };
        let msg = err.to_string();
        assert!(msg.contains("semantic_executor"));
        assert!(msg.contains("250"));
    }
}
