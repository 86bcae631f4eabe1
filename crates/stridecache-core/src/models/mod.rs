//! Data models for cached resources.
//!
//! The cache stores raw JSON; these types are what consumers decode it into
//! with [`QueryState::data_as`](crate::state::QueryState::data_as).
//!
//! - `Workout`, `WorkoutUpdate`: logged workouts and their editable fields
//! - `RunDetail`, `RunningSession`: a single run and a run shared as a post
//! - `Podium`, `LeaderboardEntry`, `Brand`: social and ranking listings
//! - `Paginated<T>`: envelope for page-addressed lists

pub mod run;
pub mod social;
pub mod workout;

use serde::{Deserialize, Serialize};

pub use run::{RunDetail, RunningSession, Split};
pub use social::{Brand, LeaderboardEntry, Podium};
pub use workout::{Workout, WorkoutUpdate};

/// One page of a list resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    #[serde(default = "Vec::new", alias = "data")]
    pub items: Vec<T>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Paginated<T> {
    /// Whether a page after this one exists. Falls back to the page size
    /// when the server reports neither `hasMore` nor `total`.
    pub fn has_next(&self) -> bool {
        if self.has_more {
            return true;
        }
        match self.total {
            Some(total) => u64::from(self.page) * u64::from(self.limit) < total,
            None => self.limit > 0 && self.items.len() as u32 >= self.limit,
        }
    }
}
