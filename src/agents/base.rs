use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{CareError, Result};
use crate::lifecycle::{AgentStateMachine, LifecycleEvent};
use crate::types::{AgentId, AgentMessage, AgentState};

pub type Outbox = mpsc::UnboundedSender<AgentMessage>;

/// State every concrete agent embeds: identity, lifecycle state, the
/// connection to the orchestrator, and the background tasks it owns.
pub struct AgentCore {
    id: AgentId,
    state: Mutex<AgentState>,
    outbox: Mutex<Option<Outbox>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentCore {
    pub fn new(id: impl Into<AgentId>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id: id.into(),
            state: Mutex::new(AgentState::Registered),
            outbox: Mutex::new(None),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> AgentState {
        *self.state.lock().await
    }

    pub async fn connect(&self, outbox: Outbox) {
        *self.outbox.lock().await = Some(outbox);
    }

    pub async fn is_connected(&self) -> bool {
        self.outbox.lock().await.is_some()
    }

    pub async fn begin_start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        AgentStateMachine::transition(&self.id, &mut state, LifecycleEvent::StartRequested)?;
        Ok(())
    }

    /// Records the outcome of the agent's setup and passes it through.
    pub async fn finish_start(&self, outcome: Result<()>) -> Result<()> {
        let mut state = self.state.lock().await;
        match outcome {
            Ok(()) => {
                AgentStateMachine::transition(&self.id, &mut state, LifecycleEvent::StartSucceeded)?;
                log::info!("Agent {} started", self.id);
                Ok(())
            }
            Err(e) => {
                AgentStateMachine::transition(&self.id, &mut state, LifecycleEvent::StartFailed)?;
                log::error!("Agent {} failed to start: {}", self.id, e);
                Err(e)
            }
        }
    }

    pub async fn ensure_running(&self) -> Result<()> {
        let state = self.state().await;
        if state != AgentState::Running {
            return Err(CareError::NotRunning {
                agent_id: self.id.clone(),
                state,
            });
        }
        Ok(())
    }

    /// Hands a message to the orchestrator. Returns false when it could not be sent.
    pub async fn emit(&self, message: AgentMessage) -> bool {
        let outbox = self.outbox.lock().await;
        match outbox.as_ref() {
            Some(tx) => match tx.send(message) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!(
                        "Agent {} dropped {} message {}: orchestrator bus closed",
                        self.id,
                        e.0.kind(),
                        e.0.id()
                    );
                    false
                }
            },
            None => {
                log::debug!(
                    "Agent {} is not connected; {} message {} not routed",
                    self.id,
                    message.kind(),
                    message.id()
                );
                false
            }
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub async fn track(&self, task: JoinHandle<()>) {
        self.tasks.lock().await.push(task);
    }

    /// Signals shutdown to the agent's tasks and waits up to `grace` for each
    /// one before aborting it. Repeated calls are no-ops.
    pub async fn cleanup(&self, grace: Duration) -> Result<()> {
        let new_state = {
            let mut state = self.state.lock().await;
            if matches!(*state, AgentState::Stopping | AgentState::Stopped) {
                return Ok(());
            }
            AgentStateMachine::transition(&self.id, &mut state, LifecycleEvent::CleanupRequested)?
        };

        if new_state == AgentState::Stopped {
            log::debug!("Agent {} was never started; nothing to clean up", self.id);
            return Ok(());
        }

        self.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for mut task in tasks {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => log::warn!("Agent {} task ended abnormally: {}", self.id, e),
                Err(_) => {
                    log::warn!(
                        "Agent {} task did not stop within {:?}; aborting",
                        self.id,
                        grace
                    );
                    task.abort();
                }
            }
        }

        let mut state = self.state.lock().await;
        AgentStateMachine::transition(&self.id, &mut state, LifecycleEvent::CleanupFinished)?;
        log::info!("Agent {} stopped", self.id);
        Ok(())
    }
}

/// Resolves once shutdown has been signalled or the signal's owner is gone.
pub async fn wait_for_shutdown(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}
