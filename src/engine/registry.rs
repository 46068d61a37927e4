use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::Agent;
use crate::error::{CareError, Result};
use crate::types::AgentId;

#[derive(Clone)]
pub struct AgentRegistration {
    pub agent_id: AgentId,
    pub display_name: String,
    pub agent: Arc<dyn Agent>,
    pub registered_at: DateTime<Utc>,
}

impl AgentRegistration {
    pub fn new(agent_id: AgentId, display_name: String, agent: Arc<dyn Agent>) -> Self {
        Self {
            agent_id,
            display_name,
            agent,
            registered_at: Utc::now(),
        }
    }

    /// True when `sender` names this registration, either by its routing key
    /// or by the agent's own id.
    pub fn is_sender(&self, sender: &str) -> bool {
        self.agent_id == sender || self.agent.id() == sender
    }
}

impl std::fmt::Debug for AgentRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistration")
            .field("agent_id", &self.agent_id)
            .field("display_name", &self.display_name)
            .field("agent", &self.agent.id())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Registered agents keyed by routing id, iterated in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    entries: HashMap<AgentId, AgentRegistration>,
    order: Vec<AgentId>,
    closed: bool,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, registration: AgentRegistration) -> Result<()> {
        if self.closed {
            return Err(CareError::OrchestratorStopped);
        }
        if self.entries.contains_key(&registration.agent_id) {
            return Err(CareError::DuplicateAgent(registration.agent_id));
        }
        self.order.push(registration.agent_id.clone());
        self.entries
            .insert(registration.agent_id.clone(), registration);
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentRegistration> {
        self.entries.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.entries.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentRegistration> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Removes every registration, in registration order, and refuses new ones.
    pub fn close(&mut self) -> Vec<AgentRegistration> {
        self.closed = true;
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::HealthMonitorAgent;

    fn registration(id: &str) -> AgentRegistration {
        AgentRegistration::new(
            id.to_string(),
            format!("{id} display"),
            Arc::new(HealthMonitorAgent::new(format!("{id}_1"))),
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry.insert(registration("health_monitor")).unwrap();

        assert!(registry.contains("health_monitor"));
        assert_eq!(registry.len(), 1);
        let reg = registry.get("health_monitor").unwrap();
        assert!(reg.is_sender("health_monitor"));
        assert!(reg.is_sender("health_monitor_1"));
        assert!(!reg.is_sender("safety_monitor"));
    }

    #[test]
    fn test_duplicate_rejected_and_registry_unchanged() {
        let mut registry = AgentRegistry::new();
        registry.insert(registration("a")).unwrap();

        let result = registry.insert(registration("a"));
        assert!(matches!(result, Err(CareError::DuplicateAgent(id)) if id == "a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = AgentRegistry::new();
        for id in ["c", "a", "b"] {
            registry.insert(registration(id)).unwrap();
        }
        let ids: Vec<_> = registry.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_close_drains_and_refuses() {
        let mut registry = AgentRegistry::new();
        registry.insert(registration("a")).unwrap();
        registry.insert(registration("b")).unwrap();

        let drained = registry.close();
        assert_eq!(
            drained.iter().map(|r| r.agent_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(registry.is_empty());
        assert!(matches!(
            registry.insert(registration("c")),
            Err(CareError::OrchestratorStopped)
        ));
    }
}
