use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub started_at: Option<DateTime<Utc>>,
}

impl Workout {
    /// Average pace in seconds per kilometer.
    pub fn pace_secs_per_km(&self) -> Option<f64> {
        match (self.distance_km, self.duration_secs) {
            (Some(km), Some(secs)) if km > 0.0 => Some(secs as f64 / km),
            _ => None,
        }
    }

    /// Pace as "m:ss /km", or "-" if unknown.
    pub fn pace_display(&self) -> String {
        match self.pace_secs_per_km() {
            Some(pace) => {
                let total = pace.round() as u64;
                format!("{}:{:02} /km", total / 60, total % 60)
            }
            None => "-".to_string(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Untitled workout")
    }
}

/// Editable fields of a workout. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct WorkoutUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workout() {
        let json = r#"{
            "id": "w1",
            "userId": "u9",
            "name": "Tempo",
            "distanceKm": 10.0,
            "durationSecs": 2730,
            "startedAt": "2024-05-01T06:30:00Z"
        }"#;
        let workout: Workout = serde_json::from_str(json).expect("parses");
        assert_eq!(workout.user_id.as_deref(), Some("u9"));
        assert_eq!(workout.pace_display(), "4:33 /km");
        assert!(workout.started_at.is_some());
    }

    #[test]
    fn test_pace_unknown_without_distance() {
        let workout: Workout = serde_json::from_str(r#"{"id": "w2"}"#).expect("parses");
        assert_eq!(workout.pace_display(), "-");
        assert_eq!(workout.display_name(), "Untitled workout");
    }

    #[test]
    fn test_update_omits_unset_fields() {
        let update = WorkoutUpdate {
            notes: Some("felt good".to_string()),
            ..WorkoutUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).expect("serializes"),
            serde_json::json!({"notes": "felt good"})
        );
    }
}
