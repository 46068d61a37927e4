use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CareError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

impl BloodPressure {
    pub fn new(systolic: f64, diastolic: f64) -> Self {
        Self {
            systolic,
            diastolic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One vital-signs observation for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthData {
    user_id: String,
    heart_rate: f64,
    blood_pressure: BloodPressure,
    blood_glucose: f64,
    oxygen_level: f64,
    timestamp: DateTime<Utc>,
}

impl HealthData {
    pub fn new(
        user_id: impl Into<String>,
        heart_rate: f64,
        blood_pressure: BloodPressure,
        blood_glucose: f64,
        oxygen_level: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            heart_rate,
            blood_pressure,
            blood_glucose,
            oxygen_level,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn heart_rate(&self) -> f64 {
        self.heart_rate
    }

    pub fn blood_pressure(&self) -> BloodPressure {
        self.blood_pressure
    }

    pub fn blood_glucose(&self) -> f64 {
        self.blood_glucose
    }

    pub fn oxygen_level(&self) -> f64 {
        self.oxygen_level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn validate(&self) -> Result<()> {
        validate_user_id(&self.user_id)?;
        require_finite("heart_rate", self.heart_rate)?;
        require_finite("blood_pressure.systolic", self.blood_pressure.systolic)?;
        require_finite("blood_pressure.diastolic", self.blood_pressure.diastolic)?;
        require_finite("blood_glucose", self.blood_glucose)?;
        require_finite("oxygen_level", self.oxygen_level)?;

        if self.heart_rate < 0.0 {
            return Err(CareError::validation("heart_rate", "must not be negative"));
        }
        if !(0.0..=100.0).contains(&self.oxygen_level) {
            return Err(CareError::validation(
                "oxygen_level",
                format!("{} is not a percentage", self.oxygen_level),
            ));
        }
        Ok(())
    }
}

/// One motion-sensor observation for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementData {
    user_id: String,
    acceleration: Vector3,
    position: Vector3,
    activity_level: f64,
    timestamp: DateTime<Utc>,
}

impl MovementData {
    pub fn new(
        user_id: impl Into<String>,
        acceleration: Vector3,
        position: Vector3,
        activity_level: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            acceleration,
            position,
            activity_level,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn acceleration(&self) -> Vector3 {
        self.acceleration
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn activity_level(&self) -> f64 {
        self.activity_level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn validate(&self) -> Result<()> {
        validate_user_id(&self.user_id)?;
        if !self.acceleration.is_finite() {
            return Err(CareError::validation("acceleration", "must be finite"));
        }
        if !self.position.is_finite() {
            return Err(CareError::validation("position", "must be finite"));
        }
        require_finite("activity_level", self.activity_level)?;
        if !(0.0..=1.0).contains(&self.activity_level) {
            return Err(CareError::validation(
                "activity_level",
                format!("{} is outside [0, 1]", self.activity_level),
            ));
        }
        Ok(())
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(CareError::validation("user_id", "must not be empty"));
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(CareError::validation(field, format!("{value} is not finite")));
    }
    Ok(())
}
