use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CareError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub health: HealthMonitorConfig,
    pub safety: SafetyMonitorConfig,
    pub reminder: ReminderConfig,
    pub communication: CommunicationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on one recipient's `handle_message`.
    pub delivery_timeout_ms: u64,
    /// Upper bound on one agent's `cleanup`.
    pub cleanup_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 2_000,
            cleanup_timeout_ms: 10_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    pub window_size: usize,
    /// Users tracked at once; the least recently seen is forgotten beyond this.
    pub max_users: usize,
    /// Breaches of one metric within the window before an alert is flagged sustained.
    pub sustained_count: usize,
    pub heart_rate_min: f64,
    pub heart_rate_max: f64,
    pub systolic_max: f64,
    pub diastolic_max: f64,
    pub glucose_min: f64,
    pub glucose_max: f64,
    pub oxygen_min: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            max_users: 1_000,
            sustained_count: 3,
            heart_rate_min: 60.0,
            heart_rate_max: 100.0,
            systolic_max: 140.0,
            diastolic_max: 90.0,
            glucose_min: 70.0,
            glucose_max: 180.0,
            oxygen_min: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyMonitorConfig {
    pub window_size: usize,
    pub max_users: usize,
    /// Acceleration magnitude above which a fall is suspected.
    pub fall_threshold: f64,
    /// Activity level below which a sample counts as inactive.
    pub inactivity_threshold: f64,
}

impl Default for SafetyMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            max_users: 1_000,
            fall_threshold: 3.0,
            inactivity_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderItem {
    pub category: String,
    pub message: String,
}

impl ReminderItem {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub interval_secs: u64,
    pub recipient: String,
    pub schedule: Vec<ReminderItem>,
    /// Pending alert follow-ups kept at once; the oldest is dropped beyond this.
    pub max_follow_ups: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            recipient: "communication".to_string(),
            schedule: vec![
                ReminderItem::new("medication", "Time to take your medication"),
                ReminderItem::new("hydration", "Remember to drink a glass of water"),
                ReminderItem::new("activity", "A short walk would do you good"),
            ],
            max_follow_ups: 10,
        }
    }
}

impl ReminderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    /// Upper bound on a single notification send.
    pub send_timeout_ms: u64,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
        }
    }
}

impl CommunicationConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CareError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| CareError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// File settings (if any) with `ELDERCARE_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(size) = parse_var::<usize>(&lookup, "ELDERCARE_WINDOW_SIZE")? {
            self.health.window_size = size;
            self.safety.window_size = size;
        }
        if let Some(threshold) = parse_var::<f64>(&lookup, "ELDERCARE_FALL_THRESHOLD")? {
            self.safety.fall_threshold = threshold;
        }
        if let Some(threshold) = parse_var::<f64>(&lookup, "ELDERCARE_INACTIVITY_THRESHOLD")? {
            self.safety.inactivity_threshold = threshold;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ELDERCARE_REMINDER_INTERVAL_SECS")? {
            self.reminder.interval_secs = secs;
        }
        if let Some(recipient) = lookup("ELDERCARE_REMINDER_RECIPIENT") {
            self.reminder.recipient = recipient;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ELDERCARE_DELIVERY_TIMEOUT_MS")? {
            self.orchestrator.delivery_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.health.window_size == 0 || self.safety.window_size == 0 {
            return Err(CareError::Config("window_size must be at least 1".to_string()));
        }
        if self.health.max_users == 0 || self.safety.max_users == 0 {
            return Err(CareError::Config("max_users must be at least 1".to_string()));
        }
        if self.health.sustained_count == 0 {
            return Err(CareError::Config("sustained_count must be at least 1".to_string()));
        }
        if self.health.heart_rate_min >= self.health.heart_rate_max {
            return Err(CareError::Config("heart rate range is empty".to_string()));
        }
        if self.health.glucose_min >= self.health.glucose_max {
            return Err(CareError::Config("glucose range is empty".to_string()));
        }
        if self.safety.fall_threshold <= 0.0 {
            return Err(CareError::Config("fall_threshold must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.safety.inactivity_threshold) {
            return Err(CareError::Config(
                "inactivity_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.reminder.interval_secs == 0 {
            return Err(CareError::Config("reminder interval must be positive".to_string()));
        }
        if self.orchestrator.delivery_timeout_ms == 0 || self.orchestrator.cleanup_timeout_ms == 0 {
            return Err(CareError::Config("orchestrator timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CareError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.health.window_size, 10);
        assert_eq!(config.reminder.recipient, "communication");
        assert_eq!(config.reminder.schedule.len(), 3);
        assert_eq!(config.reminder.max_follow_ups, 10);
        assert_eq!(config.health.max_users, 1_000);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ELDERCARE_WINDOW_SIZE", "5"),
            ("ELDERCARE_FALL_THRESHOLD", "2.5"),
            ("ELDERCARE_REMINDER_RECIPIENT", "pager"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.health.window_size, 5);
        assert_eq!(config.safety.window_size, 5);
        assert_eq!(config.safety.fall_threshold, 2.5);
        assert_eq!(config.reminder.recipient, "pager");
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "ELDERCARE_WINDOW_SIZE").then(|| "ten".to_string())
        });
        assert!(matches!(result, Err(CareError::Config(_))));
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[safety]
fall_threshold = 2.0

[reminder]
interval_secs = 5
schedule = [{{ category = "hydration", message = "Drink water" }}]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.safety.fall_threshold, 2.0);
        assert_eq!(config.safety.window_size, 10);
        assert_eq!(config.reminder.interval_secs, 5);
        assert_eq!(config.reminder.schedule, vec![ReminderItem::new("hydration", "Drink water")]);
        assert_eq!(config.health.heart_rate_max, 100.0);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[health]\nwindow_size = 0").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(CareError::Config(_))));
    }
}
