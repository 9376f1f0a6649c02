use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trackable food whose daily presence is tested as a candidate trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One logged meal: the food was eaten at this instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealLogRecord {
    pub id: Uuid,
    pub food_id: Uuid,
    pub eaten_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A trackable symptom whose daily severity is tested as a candidate effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One logged symptom observation with an ordinal severity (0-10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomLogRecord {
    pub id: Uuid,
    pub symptom_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub severity: u8,
}

/// Coarse trust bucketing of a correlation's sample size, for UI display.
/// Not a statistical confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

const HIGH_CONFIDENCE_MIN_DAYS: usize = 30;
const MEDIUM_CONFIDENCE_MIN_DAYS: usize = 14;

impl ConfidenceLevel {
    pub fn from_sample_size(sample_size: usize) -> Self {
        if sample_size >= HIGH_CONFIDENCE_MIN_DAYS {
            ConfidenceLevel::High
        } else if sample_size >= MEDIUM_CONFIDENCE_MIN_DAYS {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// One ranked food-symptom association from an analysis run.
///
/// The id is derived from the participating food and symptom so re-running an
/// analysis produces the same ids for the same pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub id: String,
    pub food_id: Uuid,
    pub symptom_id: Uuid,
    pub score: f64,
    pub sample_size: usize,
    pub confidence: ConfidenceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

pub fn correlation_id(food_id: Uuid, symptom_id: Uuid) -> String {
    format!("{food_id}:{symptom_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_boundaries() {
        assert_eq!(ConfidenceLevel::from_sample_size(30), ConfidenceLevel::High);
        assert_eq!(
            ConfidenceLevel::from_sample_size(29),
            ConfidenceLevel::Medium
        );
        assert_eq!(
            ConfidenceLevel::from_sample_size(14),
            ConfidenceLevel::Medium
        );
        assert_eq!(ConfidenceLevel::from_sample_size(13), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_sample_size(3), ConfidenceLevel::Low);
    }

    #[test]
    fn correlation_id_is_stable_for_a_pair() {
        let food = Uuid::new_v4();
        let symptom = Uuid::new_v4();
        assert_eq!(
            correlation_id(food, symptom),
            correlation_id(food, symptom)
        );
        assert_ne!(
            correlation_id(food, symptom),
            correlation_id(symptom, food)
        );
    }
}
