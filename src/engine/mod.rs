pub mod orchestrator;
pub mod registry;

pub use orchestrator::{
    AgentStatus, CleanupReport, DispatchReport, DispatchStats, Orchestrator, ORCHESTRATOR_ID,
};
pub use registry::{AgentRegistration, AgentRegistry};
