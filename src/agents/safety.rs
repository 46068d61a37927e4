use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

use super::base::{AgentCore, Outbox};
use super::window::UserWindows;
use super::{Lifecycle, MessageHandler};
use crate::config::SafetyMonitorConfig;
use crate::error::Result;
use crate::types::{AgentId, AgentMessage, AgentState, MessageKind, MovementData, UserId};

pub const FALL_ALERT: &str = "possible fall";
pub const INACTIVITY_ALERT: &str = "prolonged inactivity";

struct SafetyWindows {
    windows: UserWindows<MovementData>,
    /// Users with an inactivity episode already reported.
    inactive: HashSet<UserId>,
}

/// Detects falls and prolonged inactivity from motion readings.
pub struct SafetyMonitorAgent {
    core: AgentCore,
    config: SafetyMonitorConfig,
    state: Mutex<SafetyWindows>,
}

impl SafetyMonitorAgent {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self::with_config(id, SafetyMonitorConfig::default())
    }

    pub fn with_config(id: impl Into<AgentId>, config: SafetyMonitorConfig) -> Self {
        Self {
            core: AgentCore::new(id),
            state: Mutex::new(SafetyWindows {
                windows: UserWindows::with_max_users(config.window_size, config.max_users),
                inactive: HashSet::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &SafetyMonitorConfig {
        &self.config
    }

    pub async fn process_movement_data(&self, record: MovementData) -> Result<Vec<AgentMessage>> {
        record.validate()?;
        self.core.ensure_running().await?;

        let mut state = self.state.lock().await;
        let SafetyWindows { windows, inactive } = &mut *state;

        let mut alerts = Vec::new();
        let user_id = record.user_id().to_string();

        let magnitude = record.acceleration().magnitude();
        if magnitude > self.config.fall_threshold {
            log::warn!(
                "Agent {}: {} for {} (|a| = {:.2})",
                self.core.id(),
                FALL_ALERT,
                user_id,
                magnitude
            );
            alerts.push(AgentMessage::alert(
                self.core.id(),
                json!({
                    "alert": FALL_ALERT,
                    "user_id": user_id,
                    "metric": "acceleration_magnitude",
                    "value": magnitude,
                    "threshold": self.config.fall_threshold,
                    "position": record.position(),
                    "recorded_at": record.timestamp(),
                }),
            ));
        }

        let active = record.activity_level() >= self.config.inactivity_threshold;
        let window = windows.push(&user_id, record);

        if active {
            inactive.remove(&user_id);
        } else if window.is_full()
            && window.all(|r| r.activity_level() < self.config.inactivity_threshold)
            && inactive.insert(user_id.clone())
        {
            let mean_activity =
                window.iter().map(MovementData::activity_level).sum::<f64>() / window.len() as f64;
            log::warn!(
                "Agent {}: {} for {} over {} samples",
                self.core.id(),
                INACTIVITY_ALERT,
                user_id,
                window.len()
            );
            alerts.push(AgentMessage::alert(
                self.core.id(),
                json!({
                    "alert": INACTIVITY_ALERT,
                    "user_id": user_id,
                    "metric": "activity_level",
                    "value": mean_activity,
                    "threshold": self.config.inactivity_threshold,
                    "samples": window.len(),
                    "since": window.iter().next().map(MovementData::timestamp),
                }),
            ));
        }

        if let Some(user) = windows.take_evicted() {
            inactive.remove(&user);
            log::debug!(
                "Agent {}: forgot {} to stay within {} tracked users",
                self.core.id(),
                user,
                windows.max_users()
            );
        }

        for alert in &alerts {
            self.core.emit(alert.clone()).await;
        }

        Ok(alerts)
    }

    pub async fn window_snapshot(&self, user_id: &str) -> Vec<MovementData> {
        self.state
            .lock()
            .await
            .windows
            .get(user_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Lifecycle for SafetyMonitorAgent {
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
        {
            let mut state = self.state.lock().await;
            state.windows.clear();
            state.inactive.clear();
        }
        self.core.finish_start(Ok(())).await
    }

    async fn cleanup(&self) -> Result<()> {
        if let Err(e) = self.core.cleanup(Duration::from_secs(1)).await {
            log::warn!("Agent {} cleanup: {}", self.core.id(), e);
        }
        let mut state = self.state.lock().await;
        state.windows.clear();
        state.inactive.clear();
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for SafetyMonitorAgent {
    fn accepts(&self, kind: MessageKind) -> bool {
        kind == MessageKind::Status
    }

    async fn handle_message(&self, message: &AgentMessage) -> anyhow::Result<()> {
        log::debug!(
            "Agent {} received {} from {}",
            self.core.id(),
            message.kind(),
            message.sender_id()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vector3;

    fn sample(acceleration: Vector3, activity: f64) -> MovementData {
        MovementData::new("user_1", acceleration, Vector3::new(1.0, 2.0, 0.0), activity)
    }

    async fn running_agent(window_size: usize) -> SafetyMonitorAgent {
        let agent = SafetyMonitorAgent::with_config(
            "safety_monitor",
            SafetyMonitorConfig {
                window_size,
                ..SafetyMonitorConfig::default()
            },
        );
        agent.start().await.unwrap();
        agent
    }

    #[tokio::test]
    async fn test_fall_detection() {
        let agent = running_agent(10).await;

        let calm = agent
            .process_movement_data(sample(Vector3::new(0.5, 0.5, 1.0), 0.5))
            .await
            .unwrap();
        assert!(calm.is_empty());

        let impact = agent
            .process_movement_data(sample(Vector3::new(3.0, 4.0, 0.0), 0.5))
            .await
            .unwrap();
        assert_eq!(impact.len(), 1);
        assert_eq!(impact[0].payload()["alert"], FALL_ALERT);
        assert_eq!(impact[0].payload()["value"], 5.0);
    }

    #[tokio::test]
    async fn test_inactivity_requires_full_window() {
        let agent = running_agent(4).await;

        for i in 1..=3 {
            let alerts = agent
                .process_movement_data(sample(Vector3::default(), 0.0))
                .await
                .unwrap();
            assert!(alerts.is_empty(), "no alert expected at sample {i}");
        }

        let alerts = agent
            .process_movement_data(sample(Vector3::default(), 0.0))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].payload()["alert"], INACTIVITY_ALERT);
        assert_eq!(alerts[0].payload()["samples"], 4);
    }

    #[tokio::test]
    async fn test_inactivity_reported_once_per_episode() {
        let agent = running_agent(2).await;
        let idle = || sample(Vector3::default(), 0.0);

        agent.process_movement_data(idle()).await.unwrap();
        assert_eq!(agent.process_movement_data(idle()).await.unwrap().len(), 1);
        assert!(agent.process_movement_data(idle()).await.unwrap().is_empty());

        // Activity ends the episode.
        agent
            .process_movement_data(sample(Vector3::default(), 0.8))
            .await
            .unwrap();
        assert!(agent.process_movement_data(idle()).await.unwrap().is_empty());
        assert_eq!(agent.process_movement_data(idle()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_sample_in_window_blocks_inactivity() {
        let agent = running_agent(3).await;

        agent
            .process_movement_data(sample(Vector3::default(), 0.9))
            .await
            .unwrap();
        for _ in 0..2 {
            let alerts = agent
                .process_movement_data(sample(Vector3::default(), 0.0))
                .await
                .unwrap();
            assert!(alerts.is_empty());
        }

        // The active sample is evicted by the third idle one.
        let alerts = agent
            .process_movement_data(sample(Vector3::default(), 0.0))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(agent.window_snapshot("user_1").await.len(), 3);
    }

    #[tokio::test]
    async fn test_windows_are_per_user() {
        let agent = running_agent(2).await;
        let idle = |user: &str| MovementData::new(user, Vector3::default(), Vector3::default(), 0.0);

        assert!(agent.process_movement_data(idle("a")).await.unwrap().is_empty());
        assert!(agent.process_movement_data(idle("b")).await.unwrap().is_empty());
        assert_eq!(agent.process_movement_data(idle("a")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forgotten_user_starts_a_fresh_episode() {
        let agent = SafetyMonitorAgent::with_config(
            "safety_monitor",
            SafetyMonitorConfig {
                window_size: 2,
                max_users: 2,
                ..SafetyMonitorConfig::default()
            },
        );
        agent.start().await.unwrap();
        let idle = |user: &str| MovementData::new(user, Vector3::default(), Vector3::default(), 0.0);

        agent.process_movement_data(idle("a")).await.unwrap();
        assert_eq!(agent.process_movement_data(idle("a")).await.unwrap().len(), 1);

        // Two newer users push "a" out, latch included.
        agent.process_movement_data(idle("b")).await.unwrap();
        agent.process_movement_data(idle("c")).await.unwrap();
        {
            let state = agent.state.lock().await;
            assert_eq!(state.windows.user_count(), 2);
            assert!(!state.inactive.contains("a"));
        }
        assert!(agent.window_snapshot("a").await.is_empty());

        agent.process_movement_data(idle("a")).await.unwrap();
        assert_eq!(agent.process_movement_data(idle("a")).await.unwrap().len(), 1);
    }
}
