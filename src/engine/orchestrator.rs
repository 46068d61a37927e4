use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::registry::{AgentRegistration, AgentRegistry};
use crate::agents::base::wait_for_shutdown;
use crate::agents::{Agent, Outbox};
use crate::config::OrchestratorConfig;
use crate::error::{CareError, LifecycleStage, Result};
use crate::types::{AgentId, AgentMessage, AgentState, OrchestratorState, Recipient};

pub const ORCHESTRATOR_ID: &str = "orchestrator";

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Outcome of routing one message.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub delivered: Vec<AgentId>,
    pub failed: Vec<(AgentId, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub cleaned: Vec<AgentId>,
    pub failed: Vec<(AgentId, String)>,
}

impl CleanupReport {
    pub fn attempted(&self) -> usize {
        self.cleaned.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub display_name: String,
    pub state: AgentState,
    pub registered_at: DateTime<Utc>,
}

/// Resolves recipients against the registry and delivers messages.
#[derive(Clone)]
struct Router {
    registry: Arc<RwLock<AgentRegistry>>,
    delivery_timeout: Duration,
    counters: Arc<DispatchCounters>,
}

impl Router {
    async fn dispatch(&self, message: AgentMessage) -> Result<DispatchReport> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let (targets, direct) = {
            let registry = self.registry.read().await;
            if registry.is_closed() {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(CareError::OrchestratorStopped);
            }

            match message.recipient() {
                Recipient::Agent(id) => match registry.get(id) {
                    Some(registration) => (vec![target(registration)], true),
                    None => {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        return Err(CareError::UnknownRecipient(id.clone()));
                    }
                },
                Recipient::Broadcast => (
                    registry
                        .iter()
                        .filter(|r| !r.is_sender(message.sender_id()))
                        .filter(|r| r.agent.accepts(message.kind()))
                        .map(target)
                        .collect::<Vec<_>>(),
                    false,
                ),
            }
        };

        let mut report = DispatchReport::default();
        let message = Arc::new(message);
        let mut deliveries = Vec::with_capacity(targets.len());

        for (agent_id, agent) in targets {
            let state = agent.state().await;
            if state != AgentState::Running {
                if direct {
                    report
                        .failed
                        .push((agent_id, format!("recipient is not running (state: {state})")));
                } else {
                    log::debug!(
                        "Skipping {} for {} message {}: state {}",
                        agent_id,
                        message.kind(),
                        message.id(),
                        state
                    );
                }
                continue;
            }

            let message = message.clone();
            let timeout = self.delivery_timeout;
            // Spawned so that a panicking handler is contained to its own task.
            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, agent.handle_message(&message)).await
            });
            deliveries.push((agent_id, handle));
        }

        for (agent_id, handle) in deliveries {
            match handle.await {
                Ok(Ok(Ok(()))) => report.delivered.push(agent_id),
                Ok(Ok(Err(e))) => report.failed.push((agent_id, e.to_string())),
                Ok(Err(_)) => report.failed.push((
                    agent_id,
                    format!("timed out after {:?}", self.delivery_timeout),
                )),
                Err(e) => report.failed.push((agent_id, format!("handler panicked: {e}"))),
            }
        }

        for (agent_id, reason) in &report.failed {
            log::error!(
                "Delivery of {} message {} from {} to {} failed during {}: {}",
                message.kind(),
                message.id(),
                message.sender_id(),
                agent_id,
                LifecycleStage::HandleMessage,
                reason
            );
        }

        self.counters
            .delivered
            .fetch_add(report.delivered.len() as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);

        Ok(report)
    }

    async fn run(
        self,
        mut inbox: mpsc::UnboundedReceiver<AgentMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                next = inbox.recv() => match next {
                    Some(message) => {
                        let id = message.id();
                        if let Err(e) = self.dispatch(message).await {
                            log::warn!("Dropped message {}: {}", id, e);
                        }
                    }
                    None => break,
                },
            }
        }

        inbox.close();
        let mut undelivered = 0u64;
        while inbox.try_recv().is_ok() {
            undelivered += 1;
        }
        if undelivered > 0 {
            self.counters
                .dropped
                .fetch_add(undelivered, Ordering::Relaxed);
            log::warn!("Dispatch loop stopped with {} queued message(s) undelivered", undelivered);
        }
        log::debug!("Dispatch loop stopped");
    }
}

fn target(registration: &AgentRegistration) -> (AgentId, Arc<dyn Agent>) {
    (registration.agent_id.clone(), registration.agent.clone())
}

/// Owns the agent registry, routes messages between agents and supervises
/// fleet start-up and tear-down.
pub struct Orchestrator {
    config: OrchestratorConfig,
    state: Mutex<OrchestratorState>,
    router: Router,
    bus: Outbox,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<AgentMessage>>>,
    shutdown: watch::Sender<bool>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let (bus, inbox) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            router: Router {
                registry: Arc::new(RwLock::new(AgentRegistry::new())),
                delivery_timeout: config.delivery_timeout(),
                counters: Arc::new(DispatchCounters::default()),
            },
            config,
            state: Mutex::new(OrchestratorState::Unstarted),
            bus,
            inbox: Mutex::new(Some(inbox)),
            shutdown,
            dispatch_task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> OrchestratorState {
        *self.state.lock().await
    }

    pub async fn register_agent(
        &self,
        agent_id: impl Into<AgentId>,
        display_name: impl Into<String>,
        agent: Arc<dyn Agent>,
    ) -> Result<()> {
        let agent_id = agent_id.into();
        let mut registry = self.router.registry.write().await;
        registry.insert(AgentRegistration::new(
            agent_id.clone(),
            display_name.into(),
            agent.clone(),
        ))?;
        agent.connect(self.bus.clone()).await;
        log::info!("Registered agent {} ({})", agent_id, agent.id());
        Ok(())
    }

    /// Starts the dispatch loop. Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            OrchestratorState::Running => {
                log::debug!("Orchestrator already running");
                return Ok(());
            }
            OrchestratorState::Stopping | OrchestratorState::Stopped => {
                return Err(CareError::OrchestratorStopped);
            }
            OrchestratorState::Unstarted => {}
        }

        let inbox = self
            .inbox
            .lock()
            .await
            .take()
            .ok_or(CareError::OrchestratorStopped)?;
        let task = tokio::spawn(self.router.clone().run(inbox, self.shutdown.subscribe()));
        *self.dispatch_task.lock().await = Some(task);

        *state = OrchestratorState::Running;
        log::info!("Orchestrator started");
        Ok(())
    }

    /// Starts every registered agent that has not been started yet, concurrently.
    /// Any failure fails the whole call, listing each agent that did not start.
    pub async fn start_agents(&self) -> Result<()> {
        let pending: Vec<(AgentId, Arc<dyn Agent>)> = {
            let registry = self.router.registry.read().await;
            registry.iter().map(target).collect()
        };

        let mut to_start = Vec::new();
        for (agent_id, agent) in pending {
            if agent.state().await == AgentState::Registered {
                to_start.push((agent_id, agent));
            }
        }

        let outcomes = join_all(to_start.iter().map(|(agent_id, agent)| async move {
            log::info!("Starting agent {}", agent_id);
            (agent_id.clone(), agent.start().await)
        }))
        .await;

        let mut failures = Vec::new();
        let mut started = 0;
        for (agent_id, outcome) in outcomes {
            match outcome {
                Ok(()) => started += 1,
                Err(e) => {
                    log::error!(
                        "Agent {} failed during {}: {}",
                        agent_id,
                        LifecycleStage::Start,
                        e
                    );
                    failures.push((agent_id, e.to_string()));
                }
            }
        }

        if !failures.is_empty() {
            return Err(CareError::Startup { failures });
        }

        log::info!("Started {} agent(s)", started);
        self.bus
            .send(AgentMessage::status(
                ORCHESTRATOR_ID,
                json!({"event": "fleet_started", "agents": started}),
            ))
            .map_err(|_| CareError::OrchestratorStopped)?;
        Ok(())
    }

    /// Routes one message immediately, bypassing the queue.
    pub async fn dispatch(&self, message: AgentMessage) -> Result<DispatchReport> {
        self.router.dispatch(message).await
    }

    /// Queues a message for the dispatch loop.
    pub fn submit(&self, message: AgentMessage) -> Result<()> {
        self.bus
            .send(message)
            .map_err(|_| CareError::OrchestratorStopped)
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.router.counters;
        DispatchStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    pub async fn agent_ids(&self) -> Vec<AgentId> {
        let registry = self.router.registry.read().await;
        registry.iter().map(|r| r.agent_id.clone()).collect()
    }

    pub async fn agent_state(&self, agent_id: &str) -> Option<AgentState> {
        let agent = {
            let registry = self.router.registry.read().await;
            registry.get(agent_id).map(|r| r.agent.clone())
        }?;
        Some(agent.state().await)
    }

    pub async fn status(&self) -> Vec<AgentStatus> {
        let registrations: Vec<AgentRegistration> = {
            let registry = self.router.registry.read().await;
            registry.iter().cloned().collect()
        };

        let mut status = Vec::with_capacity(registrations.len());
        for registration in registrations {
            status.push(AgentStatus {
                state: registration.agent.state().await,
                agent_id: registration.agent_id,
                display_name: registration.display_name,
                registered_at: registration.registered_at,
            });
        }
        status
    }

    pub async fn stop(&self) -> CleanupReport {
        self.cleanup().await
    }

    /// Stops the dispatch loop, then cleans up every agent in registration
    /// order. One agent failing or hanging does not stop the others from
    /// being cleaned up. A second call does nothing.
    pub async fn cleanup(&self) -> CleanupReport {
        {
            let mut state = self.state.lock().await;
            if matches!(
                *state,
                OrchestratorState::Stopping | OrchestratorState::Stopped
            ) {
                return CleanupReport::default();
            }
            *state = OrchestratorState::Stopping;
        }
        log::info!("Orchestrator stopping");

        let timeout = self.config.cleanup_timeout();
        self.shutdown.send_replace(true);
        if let Some(mut task) = self.dispatch_task.lock().await.take() {
            if tokio::time::timeout(timeout, &mut task).await.is_err() {
                log::warn!("Dispatch loop did not stop within {:?}; aborting", timeout);
                task.abort();
            }
        }

        let registrations = self.router.registry.write().await.close();
        let mut report = CleanupReport::default();

        for registration in registrations {
            let agent = registration.agent.clone();
            let mut handle = tokio::spawn(async move { agent.cleanup().await });
            let outcome = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(e.to_string()),
                Ok(Err(e)) => Err(format!("cleanup panicked: {e}")),
                Err(_) => {
                    handle.abort();
                    Err(format!("cleanup timed out after {:?}", timeout))
                }
            };

            match outcome {
                Ok(()) => report.cleaned.push(registration.agent_id),
                Err(reason) => {
                    log::error!(
                        "Agent {} failed during {}: {}",
                        registration.agent_id,
                        LifecycleStage::Cleanup,
                        reason
                    );
                    report.failed.push((registration.agent_id, reason));
                }
            }
        }

        *self.state.lock().await = OrchestratorState::Stopped;
        log::info!(
            "Orchestrator stopped ({} cleaned, {} failed)",
            report.cleaned.len(),
            report.failed.len()
        );
        report
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
