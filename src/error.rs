use thiserror::Error;

use crate::types::{AgentId, AgentState};

pub type Result<T> = std::result::Result<T, CareError>;

#[derive(Debug, Error)]
pub enum CareError {
    #[error("agent '{0}' is already registered")]
    DuplicateAgent(AgentId),

    #[error("no agent registered under '{0}'")]
    UnknownRecipient(AgentId),

    #[error("agent '{agent_id}' failed during {stage}: {reason}")]
    AgentLifecycle {
        agent_id: AgentId,
        stage: LifecycleStage,
        reason: String,
    },

    #[error("invalid record field '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("agent '{0}' has already been started")]
    AlreadyStarted(AgentId),

    #[error("agent '{agent_id}' is not running (state: {state})")]
    NotRunning { agent_id: AgentId, state: AgentState },

    #[error("orchestrator has been stopped")]
    OrchestratorStopped,

    #[error("fleet startup failed for {} agent(s): {}", .failures.len(), format_failures(.failures))]
    Startup { failures: Vec<(AgentId, String)> },

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Start,
    Cleanup,
    HandleMessage,
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStage::Start => write!(f, "start"),
            LifecycleStage::Cleanup => write!(f, "cleanup"),
            LifecycleStage::HandleMessage => write!(f, "message handling"),
        }
    }
}

impl CareError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CareError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn lifecycle(agent_id: &str, stage: LifecycleStage, reason: impl ToString) -> Self {
        CareError::AgentLifecycle {
            agent_id: agent_id.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

fn format_failures(failures: &[(AgentId, String)]) -> String {
    failures
        .iter()
        .map(|(id, reason)| format!("{id}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
