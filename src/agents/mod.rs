pub mod base;
pub mod communication;
pub mod health;
pub mod reminder;
pub mod safety;
pub mod window;

pub use base::{AgentCore, Outbox};
pub use communication::CommunicationAgent;
pub use health::HealthMonitorAgent;
pub use reminder::ReminderAgent;
pub use safety::SafetyMonitorAgent;
pub use window::{RollingWindow, UserWindows};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentMessage, AgentState, MessageKind};

/// Identity and start/cleanup contract shared by every agent.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn id(&self) -> &str;

    async fn state(&self) -> AgentState;

    /// Attaches the orchestrator's message bus; emitted messages are sent here.
    async fn connect(&self, outbox: Outbox);

    /// Valid once, from `Registered`. A second call fails with `AlreadyStarted`.
    async fn start(&self) -> Result<()>;

    /// Releases resources. A no-op if `start` never succeeded, and idempotent.
    async fn cleanup(&self) -> Result<()>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Subscription filter applied to broadcast messages.
    fn accepts(&self, _kind: MessageKind) -> bool {
        true
    }

    async fn handle_message(&self, message: &AgentMessage) -> anyhow::Result<()>;
}

/// Everything the orchestrator needs to hold and route to an agent.
pub trait Agent: Lifecycle + MessageHandler {}

impl<T: Lifecycle + MessageHandler + ?Sized> Agent for T {}
