use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{AgentId, MessageKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Agent(AgentId),
    /// Every registered agent except the sender.
    Broadcast,
}

impl Recipient {
    pub fn agent(id: impl Into<AgentId>) -> Self {
        Recipient::Agent(id.into())
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Recipient::Broadcast)
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Agent(id) => f.write_str(id),
            Recipient::Broadcast => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    id: Uuid,
    sender_id: AgentId,
    recipient: Recipient,
    kind: MessageKind,
    payload: Value,
    timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        sender_id: impl Into<AgentId>,
        recipient: Recipient,
        kind: MessageKind,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn alert(sender_id: impl Into<AgentId>, payload: Value) -> Self {
        Self::new(sender_id, Recipient::Broadcast, MessageKind::Alert, payload)
    }

    pub fn reminder(sender_id: impl Into<AgentId>, recipient: Recipient, payload: Value) -> Self {
        Self::new(sender_id, recipient, MessageKind::Reminder, payload)
    }

    pub fn status(sender_id: impl Into<AgentId>, payload: Value) -> Self {
        Self::new(sender_id, Recipient::Broadcast, MessageKind::Status, payload)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Short human-readable description, taken from the payload's
    /// `alert` or `message` field when present.
    pub fn summary(&self) -> String {
        self.payload
            .get("alert")
            .or_else(|| self.payload.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_is_broadcast() {
        let msg = AgentMessage::alert("health_monitor", json!({"alert": "low oxygen"}));
        assert!(msg.recipient().is_broadcast());
        assert_eq!(msg.kind(), MessageKind::Alert);
        assert_eq!(msg.summary(), "low oxygen");
    }

    #[test]
    fn test_summary_falls_back_to_kind() {
        let msg = AgentMessage::status("orchestrator", json!({}));
        assert_eq!(msg.summary(), "STATUS");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = AgentMessage::reminder("reminder", Recipient::agent("communication"), json!({}));
        let b = AgentMessage::reminder("reminder", Recipient::agent("communication"), json!({}));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.recipient(), &Recipient::Agent("communication".to_string()));
    }
}
