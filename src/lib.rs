pub mod agents;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod providers;
pub mod simulation;
pub mod types;

pub use agents::{
    Agent, CommunicationAgent, HealthMonitorAgent, Lifecycle, MessageHandler, ReminderAgent,
    SafetyMonitorAgent,
};
pub use config::Config;
pub use engine::Orchestrator;
pub use error::{CareError, Result};
pub use types::*;
