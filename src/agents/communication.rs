use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use super::base::{AgentCore, Outbox};
use super::{Lifecycle, MessageHandler};
use crate::config::CommunicationConfig;
use crate::error::{CareError, LifecycleStage, Result};
use crate::providers::notification::{LogChannel, Notification, NotificationChannel};
use crate::types::{AgentId, AgentMessage, AgentState, MessageKind};

#[derive(Debug, Default)]
struct DeliveryCounters {
    sent: AtomicU64,
    failed: AtomicU64,
}

/// The system's single egress point: turns ALERT and REMINDER messages into
/// notifications on an external channel.
pub struct CommunicationAgent {
    core: AgentCore,
    config: CommunicationConfig,
    channel: Arc<dyn NotificationChannel>,
    queue: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
    counters: Arc<DeliveryCounters>,
}

impl CommunicationAgent {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self::with_channel(id, Arc::new(LogChannel), CommunicationConfig::default())
    }

    pub fn with_channel(
        id: impl Into<AgentId>,
        channel: Arc<dyn NotificationChannel>,
        config: CommunicationConfig,
    ) -> Self {
        Self {
            core: AgentCore::new(id),
            config,
            channel,
            queue: Mutex::new(None),
            counters: Arc::new(DeliveryCounters::default()),
        }
    }

    pub fn sent_count(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Runs until the queue is closed and drained. Sends run concurrently,
    /// each bounded by `send_timeout`, and are awaited before returning.
    async fn forward(
        agent_id: AgentId,
        channel: Arc<dyn NotificationChannel>,
        mut queue: mpsc::UnboundedReceiver<Notification>,
        send_timeout: Duration,
        counters: Arc<DeliveryCounters>,
    ) {
        let mut sends = JoinSet::new();
        loop {
            tokio::select! {
                next = queue.recv() => match next {
                    Some(notification) => {
                        sends.spawn(Self::send_one(
                            agent_id.clone(),
                            channel.clone(),
                            notification,
                            send_timeout,
                            counters.clone(),
                        ));
                    }
                    None => break,
                },
                Some(_) = sends.join_next(), if !sends.is_empty() => {}
            }
        }

        if !sends.is_empty() {
            log::debug!(
                "Agent {} waiting on {} in-flight notification(s)",
                agent_id,
                sends.len()
            );
        }
        while sends.join_next().await.is_some() {}
        log::debug!("Agent {} forwarder stopped", agent_id);
    }

    async fn send_one(
        agent_id: AgentId,
        channel: Arc<dyn NotificationChannel>,
        notification: Notification,
        send_timeout: Duration,
        counters: Arc<DeliveryCounters>,
    ) {
        match tokio::time::timeout(send_timeout, channel.send(&notification)).await {
            Ok(Ok(())) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Agent {}: {} channel failed for message {}: {}",
                    agent_id,
                    channel.name(),
                    notification.message_id,
                    e
                );
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Agent {}: {} channel timed out after {:?} for message {}",
                    agent_id,
                    channel.name(),
                    send_timeout,
                    notification.message_id
                );
            }
        }
    }
}

#[async_trait]
impl Lifecycle for CommunicationAgent {
    fn id(&self) -> &str {
        self.core.id()
    }

    async fn state(&self) -> AgentState {
        self.core.state().await
    }

    async fn connect(&self, outbox: Outbox) {
        self.core.connect(outbox).await;
    }

    async fn start(&self) -> Result<()> {
        self.core.begin_start().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        *self.queue.lock().await = Some(tx);

        let task = tokio::spawn(Self::forward(
            self.core.id().to_string(),
            self.channel.clone(),
            rx,
            self.config.send_timeout(),
            self.counters.clone(),
        ));
        self.core.track(task).await;

        self.core.finish_start(Ok(())).await
    }

    async fn cleanup(&self) -> Result<()> {
        // Closing the queue lets the forwarder drain what was accepted, then exit.
        self.queue.lock().await.take();
        let grace = self.config.send_timeout() + Duration::from_secs(1);
        if let Err(e) = self.core.cleanup(grace).await {
            log::warn!("Agent {} cleanup: {}", self.core.id(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for CommunicationAgent {
    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(kind, MessageKind::Alert | MessageKind::Reminder)
    }

    async fn handle_message(&self, message: &AgentMessage) -> anyhow::Result<()> {
        if !self.accepts(message.kind()) {
            log::debug!(
                "Agent {} ignoring {} message {}",
                self.core.id(),
                message.kind(),
                message.id()
            );
            return Ok(());
        }

        let queue = self.queue.lock().await;
        let tx = queue.as_ref().ok_or_else(|| {
            CareError::lifecycle(
                self.core.id(),
                LifecycleStage::HandleMessage,
                "forwarder is not running",
            )
        })?;
        tx.send(Notification::from_message(message)).map_err(|_| {
            CareError::lifecycle(
                self.core.id(),
                LifecycleStage::HandleMessage,
                "forwarder queue closed",
            )
        })?;
        Ok(())
    }
}
