pub mod message;
pub mod records;

pub use message::{AgentMessage, Recipient};
pub use records::{BloodPressure, HealthData, MovementData, Vector3};

use serde::{Deserialize, Serialize};

pub type AgentId = String;
pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Registered,
    Starting,
    /// Accepting records and messages.
    Running,
    Stopping,
    Stopped,
    /// `start` returned an error; only cleanup remains.
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &str {
        match self {
            AgentState::Registered => "Registered",
            AgentState::Starting => "Starting",
            AgentState::Running => "Running",
            AgentState::Stopping => "Stopping",
            AgentState::Stopped => "Stopped",
            AgentState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Unstarted,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Alert,
    Reminder,
    Status,
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Alert => "ALERT",
            MessageKind::Reminder => "REMINDER",
            MessageKind::Status => "STATUS",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
