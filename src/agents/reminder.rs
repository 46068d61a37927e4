use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use super::base::{wait_for_shutdown, AgentCore, Outbox};
use super::{Lifecycle, MessageHandler};
use crate::config::{ReminderConfig, ReminderItem};
use crate::error::Result;
use crate::types::{AgentId, AgentMessage, AgentState, MessageKind, Recipient};

struct ReminderState {
    core: AgentCore,
    config: ReminderConfig,
    next_index: AtomicUsize,
    /// Follow-up checks queued by alerts, alternating with the regular schedule.
    follow_ups: Mutex<VecDeque<ReminderItem>>,
    follow_up_served_last: AtomicBool,
}

impl ReminderState {
    async fn next_item(&self) -> Option<ReminderItem> {
        let mut follow_ups = self.follow_ups.lock().await;
        let schedule = &self.config.schedule;

        if schedule.is_empty() || !self.follow_up_served_last.load(Ordering::Relaxed) {
            if let Some(item) = follow_ups.pop_front() {
                self.follow_up_served_last.store(true, Ordering::Relaxed);
                return Some(item);
            }
        }
        if schedule.is_empty() {
            return None;
        }

        self.follow_up_served_last.store(false, Ordering::Relaxed);
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        Some(schedule[index % schedule.len()].clone())
    }

    async fn queue_follow_up(&self, item: ReminderItem) {
        let limit = self.config.max_follow_ups;
        if limit == 0 {
            return;
        }

        let mut follow_ups = self.follow_ups.lock().await;
        if follow_ups.contains(&item) {
            log::debug!("Agent {} follow-up already pending: {}", self.core.id(), item.message);
            return;
        }
        while follow_ups.len() >= limit {
            if let Some(dropped) = follow_ups.pop_front() {
                log::warn!(
                    "Agent {} dropped follow-up over limit {}: {}",
                    self.core.id(),
                    limit,
                    dropped.message
                );
            }
        }
        log::debug!("Agent {} queued follow-up: {}", self.core.id(), item.message);
        follow_ups.push_back(item);
    }

    async fn tick(&self) -> Option<AgentMessage> {
        let item = self.next_item().await?;
        let message = AgentMessage::reminder(
            self.core.id(),
            Recipient::agent(self.config.recipient.clone()),
            json!({
                "category": item.category,
                "message": item.message,
            }),
        );
        log::info!(
            "Agent {}: {} reminder for {}",
            self.core.id(),
            item.category,
            self.config.recipient
        );
        self.core.emit(message.clone()).await;
        Some(message)
    }
}

/// Emits scheduled reminders on a timer, independent of sensor input.
pub struct ReminderAgent {
    inner: Arc<ReminderState>,
}

impl ReminderAgent {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self::with_config(id, ReminderConfig::default())
    }

    pub fn with_config(id: impl Into<AgentId>, config: ReminderConfig) -> Self {
        Self {
            inner: Arc::new(ReminderState {
                core: AgentCore::new(id),
                config,
                next_index: AtomicUsize::new(0),
                follow_ups: Mutex::new(VecDeque::new()),
                follow_up_served_last: AtomicBool::new(false),
            }),
        }
    }

    /// Emits the next reminder now. Returns `None` when nothing is scheduled.
    pub async fn tick(&self) -> Result<Option<AgentMessage>> {
        self.inner.core.ensure_running().await?;
        Ok(self.inner.tick().await)
    }

    pub async fn pending_follow_ups(&self) -> usize {
        self.inner.follow_ups.lock().await.len()
    }

    async fn run_timer(state: Arc<ReminderState>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let period = state.config.interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = interval.tick() => {
                    state.tick().await;
                }
            }
        }
        log::debug!("Agent {} timer stopped", state.core.id());
    }
}

#[async_trait]
impl Lifecycle for ReminderAgent {
    fn id(&self) -> &str {
        self.inner.core.id()
    }

    async fn state(&self) -> AgentState {
        self.inner.core.state().await
    }

    async fn connect(&self, outbox: Outbox) {
        self.inner.core.connect(outbox).await;
    }

    async fn start(&self) -> Result<()> {
        let core = &self.inner.core;
        core.begin_start().await?;

        let task = tokio::spawn(Self::run_timer(self.inner.clone(), core.shutdown_signal()));
        core.track(task).await;

        core.finish_start(Ok(())).await
    }

    async fn cleanup(&self) -> Result<()> {
        if let Err(e) = self.inner.core.cleanup(Duration::from_secs(1)).await {
            log::warn!("Agent {} cleanup: {}", self.inner.core.id(), e);
        }
        self.inner.follow_ups.lock().await.clear();
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ReminderAgent {
    fn accepts(&self, kind: MessageKind) -> bool {
        kind == MessageKind::Alert
    }

    async fn handle_message(&self, message: &AgentMessage) -> anyhow::Result<()> {
        if message.kind() != MessageKind::Alert {
            return Ok(());
        }

        let user = message
            .payload()
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("the user");
        let item = ReminderItem::new("follow_up", format!("Check on {}: {}", user, message.summary()));
        self.inner.queue_follow_up(item).await;
        Ok(())
    }
}
