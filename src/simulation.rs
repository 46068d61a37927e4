//! Synthetic readings for demos, using the same value ranges a healthy
//! resident produces.

use rand::Rng;

use crate::types::{BloodPressure, HealthData, MovementData, Vector3};

pub fn random_health_reading(user_id: &str) -> HealthData {
    let mut rng = rand::thread_rng();
    HealthData::new(
        user_id,
        rng.gen_range(60.0..100.0),
        BloodPressure::new(rng.gen_range(110.0..140.0), rng.gen_range(70.0..90.0)),
        rng.gen_range(70.0..180.0),
        rng.gen_range(95.0..100.0),
    )
}

pub fn random_movement_reading(user_id: &str) -> MovementData {
    let mut rng = rand::thread_rng();
    MovementData::new(
        user_id,
        Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(0.0..2.0),
        ),
        Vector3::new(
            rng.gen_range(0.0..10.0),
            rng.gen_range(0.0..10.0),
            rng.gen_range(0.0..2.0),
        ),
        rng.gen_range(0.0..1.0),
    )
}

/// One reading each for `user_1` .. `user_n`.
pub fn generate_health_data(n: usize) -> Vec<HealthData> {
    (1..=n)
        .map(|i| random_health_reading(&format!("user_{i}")))
        .collect()
}

pub fn generate_movement_data(n: usize) -> Vec<MovementData> {
    (1..=n)
        .map(|i| random_movement_reading(&format!("user_{i}")))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthAverages {
    pub heart_rate: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub blood_glucose: f64,
    pub oxygen_level: f64,
}

pub fn health_averages(data: &[HealthData]) -> Option<HealthAverages> {
    if data.is_empty() {
        return None;
    }
    let n = data.len() as f64;
    let mean = |f: fn(&HealthData) -> f64| data.iter().map(f).sum::<f64>() / n;
    Some(HealthAverages {
        heart_rate: mean(HealthData::heart_rate),
        systolic: mean(|r| r.blood_pressure().systolic),
        diastolic: mean(|r| r.blood_pressure().diastolic),
        blood_glucose: mean(HealthData::blood_glucose),
        oxygen_level: mean(HealthData::oxygen_level),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementAverages {
    pub acceleration: Vector3,
    pub position: Vector3,
    pub activity_level: f64,
}

pub fn movement_averages(data: &[MovementData]) -> Option<MovementAverages> {
    if data.is_empty() {
        return None;
    }
    let n = data.len() as f64;
    let mean = |f: fn(&MovementData) -> f64| data.iter().map(f).sum::<f64>() / n;
    Some(MovementAverages {
        acceleration: Vector3::new(
            mean(|r| r.acceleration().x),
            mean(|r| r.acceleration().y),
            mean(|r| r.acceleration().z),
        ),
        position: Vector3::new(
            mean(|r| r.position().x),
            mean(|r| r.position().y),
            mean(|r| r.position().z),
        ),
        activity_level: mean(MovementData::activity_level),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_health_data_is_valid_and_in_range() {
        let data = generate_health_data(25);
        assert_eq!(data.len(), 25);
        assert_eq!(data[0].user_id(), "user_1");
        assert_eq!(data[24].user_id(), "user_25");

        for record in &data {
            record.validate().unwrap();
            assert!((60.0..100.0).contains(&record.heart_rate()));
            assert!((95.0..100.0).contains(&record.oxygen_level()));
        }
    }

    #[test]
    fn test_generated_movement_data_is_valid() {
        for record in generate_movement_data(25) {
            record.validate().unwrap();
            assert!(record.acceleration().magnitude() < 3.0);
        }
    }

    #[test]
    fn test_averages() {
        let data = vec![
            HealthData::new("a", 60.0, BloodPressure::new(110.0, 70.0), 80.0, 96.0),
            HealthData::new("b", 80.0, BloodPressure::new(130.0, 90.0), 120.0, 98.0),
        ];
        let avg = health_averages(&data).unwrap();
        assert_eq!(avg.heart_rate, 70.0);
        assert_eq!(avg.systolic, 120.0);
        assert_eq!(avg.oxygen_level, 97.0);
        assert!(health_averages(&[]).is_none());

        let moves = vec![
            MovementData::new("a", Vector3::new(1.0, 0.0, 0.0), Vector3::default(), 0.2),
            MovementData::new("b", Vector3::new(-1.0, 0.0, 2.0), Vector3::default(), 0.4),
        ];
        let avg = movement_averages(&moves).unwrap();
        assert_eq!(avg.acceleration, Vector3::new(0.0, 0.0, 1.0));
        assert!((avg.activity_level - 0.3).abs() < 1e-9);
    }
}
