use serde::{Deserialize, Serialize};

/// A top-three finish in a recent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Podium {
    pub id: String,
    pub position: u8,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub workout_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
}

impl Podium {
    pub fn medal(&self) -> &'static str {
        match self.position {
            1 => "gold",
            2 => "silver",
            3 => "bronze",
            _ => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub workouts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paginated;

    #[test]
    fn test_parse_leaderboard_page() {
        let json = r#"{
            "items": [
                {"rank": 1, "username": "ana", "totalDistanceKm": 120.5, "workouts": 14},
                {"rank": 2, "username": "bo"}
            ],
            "page": 1,
            "limit": 10
        }"#;
        let page: Paginated<LeaderboardEntry> = serde_json::from_str(json).expect("parses");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].workouts, 0);
        assert!(!page.has_next());
    }

    #[test]
    fn test_podium_medal() {
        let podium: Podium =
            serde_json::from_str(r#"{"id": "p1", "position": 2}"#).expect("parses");
        assert_eq!(podium.medal(), "silver");
    }
}
