//! The `{status, data, error}` view handed to consumers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of one cache entry as a consumer sees it.
///
/// `data` survives revalidation and failure: a `Loading` or `Error` state may
/// still carry the last successful value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Value>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    /// Set by invalidation until the next fetch starts.
    pub is_invalidated: bool,
    /// `data` belongs to a previously displayed page.
    pub is_placeholder: bool,
    pub failure_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

fn serialize_error<S: Serializer>(error: &Option<QueryError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl QueryState {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_stale: true,
            is_invalidated: false,
            is_placeholder: false,
            failure_count: 0,
            updated_at: None,
        }
    }

    /// A state for a result that never made it into the store.
    pub(crate) fn from_result(result: Result<Value, QueryError>) -> Self {
        match result {
            Ok(data) => Self {
                status: QueryStatus::Success,
                data: Some(data),
                is_stale: false,
                updated_at: Some(Utc::now()),
                ..Self::idle()
            },
            Err(error) => Self {
                status: QueryStatus::Error,
                error: Some(error),
                failure_count: 1,
                ..Self::idle()
            },
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Settled: the last fetch either succeeded or failed for good.
    pub fn is_settled(&self) -> bool {
        self.is_success() || self.is_error()
    }

    /// Decode `data` into a domain model.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, QueryError> {
        self.data
            .as_ref()
            .map(|v| T::deserialize(v))
            .transpose()
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))
    }

    /// "just now", "5m ago", "2h ago", ... or `None` if never fetched.
    pub fn age_display(&self) -> Option<String> {
        self.updated_at.map(|at| format_age(at, Utc::now()))
    }
}

pub(crate) fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        // Round up: 1h 30m+ becomes 2h
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
