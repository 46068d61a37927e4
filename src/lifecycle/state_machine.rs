use serde::{Deserialize, Serialize};

use crate::error::{CareError, LifecycleStage, Result};
use crate::types::AgentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    StartRequested,
    StartSucceeded,
    StartFailed,
    CleanupRequested,
    CleanupFinished,
}

pub struct AgentStateMachine;

impl AgentStateMachine {
    pub fn transition(
        agent_id: &str,
        state: &mut AgentState,
        event: LifecycleEvent,
    ) -> Result<AgentState> {
        let new_state = match (*state, event) {
            (AgentState::Registered, LifecycleEvent::StartRequested) => AgentState::Starting,
            (AgentState::Starting, LifecycleEvent::StartSucceeded) => AgentState::Running,
            (AgentState::Starting, LifecycleEvent::StartFailed) => AgentState::Failed,

            (_, LifecycleEvent::StartRequested) => {
                return Err(CareError::AlreadyStarted(agent_id.to_string()));
            }

            (
                AgentState::Running | AgentState::Starting,
                LifecycleEvent::CleanupRequested,
            ) => AgentState::Stopping,
            // Nothing was acquired, so cleanup goes straight to the terminal state.
            (AgentState::Registered | AgentState::Failed, LifecycleEvent::CleanupRequested) => {
                AgentState::Stopped
            }
            (AgentState::Stopping, LifecycleEvent::CleanupFinished) => AgentState::Stopped,

            _ => {
                let stage = match event {
                    LifecycleEvent::CleanupRequested | LifecycleEvent::CleanupFinished => {
                        LifecycleStage::Cleanup
                    }
                    _ => LifecycleStage::Start,
                };
                return Err(CareError::lifecycle(
                    agent_id,
                    stage,
                    format!("invalid transition from {} on {:?}", state, event),
                ));
            }
        };

        *state = new_state;
        Ok(new_state)
    }
}
