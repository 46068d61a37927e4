use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use eldercare::agents::safety::INACTIVITY_ALERT;
use eldercare::config::{ReminderConfig, SafetyMonitorConfig};
use eldercare::providers::{Notification, NotificationChannel, Priority};
use eldercare::types::{
    BloodPressure, HealthData, MessageKind, MovementData, Recipient, Vector3,
};
use eldercare::{
    CommunicationAgent, Config, HealthMonitorAgent, Orchestrator, ReminderAgent,
    SafetyMonitorAgent,
};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    async fn snapshot(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..400 {
            if self.sent.lock().await.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.snapshot().await
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

struct Fleet {
    orchestrator: Orchestrator,
    health: Arc<HealthMonitorAgent>,
    safety: Arc<SafetyMonitorAgent>,
    reminder: Arc<ReminderAgent>,
    channel: Arc<RecordingChannel>,
}

const INACTIVITY_WINDOW: usize = 5;

async fn start_fleet() -> Fleet {
    let config = Config::default();
    let orchestrator = Orchestrator::with_config(config.orchestrator.clone());
    let channel = Arc::new(RecordingChannel::default());

    let health = Arc::new(HealthMonitorAgent::with_config(
        "health_monitor_1",
        config.health.clone(),
    ));
    let safety = Arc::new(SafetyMonitorAgent::with_config(
        "safety_monitor_1",
        SafetyMonitorConfig {
            window_size: INACTIVITY_WINDOW,
            ..config.safety.clone()
        },
    ));
    // Long interval so the timer never fires during a test.
    let reminder = Arc::new(ReminderAgent::with_config(
        "reminder_1",
        ReminderConfig {
            interval_secs: 3600,
            ..config.reminder.clone()
        },
    ));
    let communication = Arc::new(CommunicationAgent::with_channel(
        "communication_1",
        channel.clone(),
        config.communication.clone(),
    ));

    orchestrator
        .register_agent("health_monitor", "Health Monitor", health.clone())
        .await
        .unwrap();
    orchestrator
        .register_agent("safety_monitor", "Safety Monitor", safety.clone())
        .await
        .unwrap();
    orchestrator
        .register_agent("reminder", "Reminder", reminder.clone())
        .await
        .unwrap();
    orchestrator
        .register_agent("communication", "Communication", communication)
        .await
        .unwrap();
    orchestrator.start().await.unwrap();
    orchestrator.start_agents().await.unwrap();

    Fleet {
        orchestrator,
        health,
        safety,
        reminder,
        channel,
    }
}

fn normal_vitals(user: &str, heart_rate: f64) -> HealthData {
    HealthData::new(user, heart_rate, BloodPressure::new(120.0, 80.0), 100.0, 98.0)
}

fn still(user: &str) -> MovementData {
    MovementData::new(user, Vector3::new(0.0, 0.0, 0.0), Vector3::default(), 0.0)
}

#[tokio::test]
async fn test_high_heart_rate_reaches_the_caregiver_once() {
    let fleet = start_fleet().await;

    let alerts = fleet
        .health
        .process_health_data(normal_vitals("user_1", 150.0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind(), MessageKind::Alert);

    let sent = fleet.channel.wait_for(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fleet.channel.snapshot().await.len(), 1);

    let notification = &sent[0];
    assert_eq!(notification.priority, Priority::Urgent);
    assert_eq!(notification.user_id.as_deref(), Some("user_1"));
    assert_eq!(notification.details["metric"], "heart_rate");
    assert_eq!(notification.details["value"].as_f64(), Some(150.0));
    assert!(notification.text.starts_with("[ALERT]"));

    let report = fleet.orchestrator.cleanup().await;
    assert_eq!(report.cleaned.len(), 4);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_normal_readings_stay_quiet() {
    let fleet = start_fleet().await;

    for _ in 0..20 {
        let alerts = fleet
            .health
            .process_health_data(normal_vitals("user_1", 72.0))
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fleet.channel.snapshot().await.is_empty());
    fleet.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_inactivity_alert_after_a_full_still_window() {
    let fleet = start_fleet().await;

    for k in 1..INACTIVITY_WINDOW {
        let alerts = fleet.safety.process_movement_data(still("user_2")).await.unwrap();
        assert!(alerts.is_empty(), "alert raised after only {k} record(s)");
    }

    let alerts = fleet.safety.process_movement_data(still("user_2")).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].summary(), INACTIVITY_ALERT);

    let sent = fleet.channel.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].details["alert"], INACTIVITY_ALERT);
    assert_eq!(sent[0].user_id.as_deref(), Some("user_2"));

    // Still inactive: the episode was already reported.
    let alerts = fleet.safety.process_movement_data(still("user_2")).await.unwrap();
    assert!(alerts.is_empty());

    fleet.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_reminder_is_routed_to_communication() {
    let fleet = start_fleet().await;

    let message = fleet.reminder.tick().await.unwrap().unwrap();
    assert_eq!(message.kind(), MessageKind::Reminder);
    assert_eq!(message.recipient(), &Recipient::agent("communication"));

    let sent = fleet.channel.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].priority, Priority::Normal);
    assert_eq!(sent[0].message_id, message.id());
    assert!(sent[0].text.starts_with("[REMINDER]"));

    fleet.orchestrator.cleanup().await;
}

#[tokio::test]
async fn test_alert_schedules_a_follow_up_reminder() {
    let fleet = start_fleet().await;

    fleet
        .health
        .process_health_data(normal_vitals("user_3", 45.0))
        .await
        .unwrap();

    for _ in 0..400 {
        if fleet.reminder.pending_follow_ups().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fleet.reminder.pending_follow_ups().await, 1);

    let follow_up = fleet.reminder.tick().await.unwrap().unwrap();
    assert_eq!(follow_up.payload()["category"], "follow_up");
    assert_eq!(follow_up.summary(), "Check on user_3: abnormal heart rate");

    // The alert and the follow-up both go out.
    let sent = fleet.channel.wait_for(2).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(fleet.reminder.pending_follow_ups().await, 0);

    fleet.orchestrator.cleanup().await;
}
