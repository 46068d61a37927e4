use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;

use super::base::{AgentCore, Outbox};
use super::window::{RollingWindow, UserWindows};
use super::{Lifecycle, MessageHandler};
use crate::config::HealthMonitorConfig;
use crate::error::Result;
use crate::types::{AgentId, AgentMessage, AgentState, HealthData, MessageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMetric {
    HeartRate,
    BloodPressure,
    BloodGlucose,
    OxygenLevel,
}

impl HealthMetric {
    pub const ALL: [HealthMetric; 4] = [
        HealthMetric::HeartRate,
        HealthMetric::BloodPressure,
        HealthMetric::BloodGlucose,
        HealthMetric::OxygenLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthMetric::HeartRate => "heart_rate",
            HealthMetric::BloodPressure => "blood_pressure",
            HealthMetric::BloodGlucose => "blood_glucose",
            HealthMetric::OxygenLevel => "oxygen_level",
        }
    }

    pub fn alert_text(&self) -> &'static str {
        match self {
            HealthMetric::HeartRate => "abnormal heart rate",
            HealthMetric::BloodPressure => "hypertensive reading",
            HealthMetric::BloodGlucose => "glucose out of range",
            HealthMetric::OxygenLevel => "low oxygen",
        }
    }
}

/// Watches vital signs and raises one alert per breached metric.
pub struct HealthMonitorAgent {
    core: AgentCore,
    config: HealthMonitorConfig,
    windows: Mutex<UserWindows<HealthData>>,
}

impl HealthMonitorAgent {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self::with_config(id, HealthMonitorConfig::default())
    }

    pub fn with_config(id: impl Into<AgentId>, config: HealthMonitorConfig) -> Self {
        Self {
            core: AgentCore::new(id),
            windows: Mutex::new(UserWindows::with_max_users(
                config.window_size,
                config.max_users,
            )),
            config,
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Evaluates one reading, updates the user's window and emits an ALERT
    /// per breached metric. The emitted messages are also returned.
    pub async fn process_health_data(&self, record: HealthData) -> Result<Vec<AgentMessage>> {
        record.validate()?;
        self.core.ensure_running().await?;

        // Held until the alerts are emitted so one user's records stay in order.
        let mut windows = self.windows.lock().await;
        if let Some(latest) = windows.get(record.user_id()).and_then(RollingWindow::latest) {
            if record.timestamp() < latest.timestamp() {
                log::warn!(
                    "Agent {}: reading for {} arrived out of order ({} < {})",
                    self.core.id(),
                    record.user_id(),
                    record.timestamp(),
                    latest.timestamp()
                );
            }
        }

        let breached: Vec<HealthMetric> = HealthMetric::ALL
            .into_iter()
            .filter(|metric| self.breaches(*metric, &record))
            .collect();

        let window = windows.push(record.user_id(), record.clone());

        let mut alerts = Vec::with_capacity(breached.len());
        for metric in breached {
            let window_breaches = window.count_where(|r| self.breaches(metric, r));
            let payload = self.alert_payload(metric, &record, window_breaches);
            log::warn!(
                "Agent {}: {} for {} ({})",
                self.core.id(),
                metric.alert_text(),
                record.user_id(),
                payload["value"]
            );
            alerts.push(AgentMessage::alert(self.core.id(), payload));
        }
        if let Some(user) = windows.take_evicted() {
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

    /// Snapshot of the records currently held for a user, oldest first.
    pub async fn window_snapshot(&self, user_id: &str) -> Vec<HealthData> {
        self.windows
            .lock()
            .await
            .get(user_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn breaches(&self, metric: HealthMetric, record: &HealthData) -> bool {
        let c = &self.config;
        match metric {
            HealthMetric::HeartRate => {
                record.heart_rate() < c.heart_rate_min || record.heart_rate() > c.heart_rate_max
            }
            HealthMetric::BloodPressure => {
                let bp = record.blood_pressure();
                bp.systolic >= c.systolic_max || bp.diastolic >= c.diastolic_max
            }
            HealthMetric::BloodGlucose => {
                record.blood_glucose() < c.glucose_min || record.blood_glucose() > c.glucose_max
            }
            HealthMetric::OxygenLevel => record.oxygen_level() < c.oxygen_min,
        }
    }

    fn alert_payload(&self, metric: HealthMetric, record: &HealthData, window_breaches: usize) -> Value {
        let c = &self.config;
        let (value, threshold) = match metric {
            HealthMetric::HeartRate => (
                json!(record.heart_rate()),
                json!({"min": c.heart_rate_min, "max": c.heart_rate_max}),
            ),
            HealthMetric::BloodPressure => {
                let bp = record.blood_pressure();
                (
                    json!({"systolic": bp.systolic, "diastolic": bp.diastolic}),
                    json!({"systolic_max": c.systolic_max, "diastolic_max": c.diastolic_max}),
                )
            }
            HealthMetric::BloodGlucose => (
                json!(record.blood_glucose()),
                json!({"min": c.glucose_min, "max": c.glucose_max}),
            ),
            HealthMetric::OxygenLevel => (json!(record.oxygen_level()), json!({"min": c.oxygen_min})),
        };

        json!({
            "alert": metric.alert_text(),
            "user_id": record.user_id(),
            "metric": metric.as_str(),
            "value": value,
            "threshold": threshold,
            "window_breaches": window_breaches,
            "sustained": window_breaches >= c.sustained_count,
            "recorded_at": record.timestamp(),
        })
    }
}

#[async_trait]
impl Lifecycle for HealthMonitorAgent {
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
        self.windows.lock().await.clear();
        self.core.finish_start(Ok(())).await
    }

    async fn cleanup(&self) -> Result<()> {
        if let Err(e) = self.core.cleanup(Duration::from_secs(1)).await {
            log::warn!("Agent {} cleanup: {}", self.core.id(), e);
        }
        self.windows.lock().await.clear();
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for HealthMonitorAgent {
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
