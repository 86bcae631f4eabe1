use serde::{Deserialize, Serialize};

use super::workout::Workout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub km: u32,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    #[serde(flatten)]
    pub workout: Workout,
    #[serde(default)]
    pub splits: Vec<Split>,
    #[serde(default)]
    pub elevation_gain_m: Option<f64>,
    #[serde(default)]
    pub average_heart_rate: Option<u32>,
}

impl RunDetail {
    pub fn fastest_split(&self) -> Option<&Split> {
        self.splits.iter().min_by_key(|s| s.duration_secs)
    }
}

/// A run shared as a social post, addressed by the post's hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RunningSession {
    pub cast_hash: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub run: Option<RunDetail>,
}
