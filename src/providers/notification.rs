use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{AgentMessage, MessageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    User,
    Caregiver,
}

/// What leaves the system: one rendered alert or reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message_id: Uuid,
    pub source: String,
    pub priority: Priority,
    pub audience: Audience,
    pub user_id: Option<String>,
    pub text: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_message(message: &AgentMessage) -> Self {
        let (priority, audience) = match message.kind() {
            MessageKind::Alert => (Priority::Urgent, Audience::Caregiver),
            MessageKind::Reminder | MessageKind::Status => (Priority::Normal, Audience::User),
        };

        let user_id = message
            .payload()
            .get("user_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let text = match (&user_id, message.kind()) {
            (Some(user), MessageKind::Alert) => {
                format!("[{}] {} for {}", message.kind(), message.summary(), user)
            }
            _ => format!("[{}] {}", message.kind(), message.summary()),
        };

        Self {
            message_id: message.id(),
            source: message.sender_id().to_string(),
            priority,
            audience,
            user_id,
            text,
            details: message.payload().clone(),
            created_at: message.timestamp(),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log; the default egress.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        match notification.priority {
            Priority::Urgent => log::warn!(
                "NOTIFY {:?}: {} (from {})",
                notification.audience,
                notification.text,
                notification.source
            ),
            Priority::Normal => log::info!(
                "NOTIFY {:?}: {} (from {})",
                notification.audience,
                notification.text,
                notification.source
            ),
        }
        Ok(())
    }
}
