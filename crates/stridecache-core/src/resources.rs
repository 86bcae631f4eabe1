//! Per-resource query helpers.
//!
//! Each helper fixes its resource's key shape, page defaults and enable guard
//! so callers never assemble keys by hand.

use serde_json::Value;

use crate::client::QueryClient;
use crate::error::{KeyError, QueryError};
use crate::executor::QueryObserver;
use crate::key::{QueryKey, Resource};
use crate::models::WorkoutUpdate;
use crate::mutation::Mutation;
use crate::pagination::PaginatedQuery;

/// First page of every paginated resource.
pub const DEFAULT_PAGE: u32 = 1;

/// Operation name for workout edits.
pub const UPDATE_WORKOUT: &str = "updateWorkout";

/// Present and non-empty.
fn guard(id: Option<&str>) -> (&str, bool) {
    match id {
        Some(id) if !id.trim().is_empty() => (id, true),
        _ => ("", false),
    }
}

impl QueryClient {
    fn page_args(&self, page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
        (
            page.unwrap_or(DEFAULT_PAGE).max(1),
            limit.unwrap_or(self.default_limit()).max(1),
        )
    }

    pub fn recent_podiums(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PaginatedQuery, KeyError> {
        let (page, limit) = self.page_args(page, limit);
        self.paginated(QueryKey::recent_podiums(page, limit))
    }

    pub fn all_user_workouts(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PaginatedQuery, KeyError> {
        let (page, limit) = self.page_args(page, limit);
        self.paginated(QueryKey::all_user_workouts(page, limit))
    }

    pub fn leaderboard(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PaginatedQuery, KeyError> {
        let (page, limit) = self.page_args(page, limit);
        self.paginated(QueryKey::leaderboard(page, limit))
    }

    /// Stays idle until a run id is known.
    pub fn run_detail(&self, run_id: Option<&str>) -> QueryObserver {
        let (id, enabled) = guard(run_id);
        self.query_when(QueryKey::run_detail(id), enabled)
    }

    /// Stays idle until a cast hash is known.
    pub fn running_session(&self, cast_hash: Option<&str>) -> QueryObserver {
        let (hash, enabled) = guard(cast_hash);
        self.query_when(QueryKey::running_session(hash), enabled)
    }

    pub fn user_brands(&self) -> QueryObserver {
        self.query(QueryKey::user_brands())
    }

    pub fn workout_history(&self) -> QueryObserver {
        self.query(QueryKey::workout_history())
    }

    pub fn user_workouts(&self) -> QueryObserver {
        self.query(QueryKey::user_workouts())
    }

    pub fn workout(&self, id: Option<&str>) -> QueryObserver {
        let (id, enabled) = guard(id);
        self.query_when(QueryKey::workout(id), enabled)
    }

    /// Save `changes` to workout `id`. The returned workout replaces the
    /// cached `["workout", id]`; every list containing workouts goes stale.
    pub async fn update_workout(
        &self,
        id: &str,
        changes: &WorkoutUpdate,
    ) -> Result<Value, QueryError> {
        let mut input =
            serde_json::to_value(changes).map_err(|e| QueryError::Validation(e.to_string()))?;
        if let Some(fields) = input.as_object_mut() {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        self.mutate(update_workout_mutation(id), input).await
    }
}

/// Cache effects of editing workout `id`.
pub fn update_workout_mutation(id: &str) -> Mutation {
    Mutation::new(UPDATE_WORKOUT)
        .replace(QueryKey::workout(id))
        .invalidates(Resource::WorkoutHistory)
        .invalidates(Resource::AllUserWorkouts)
        .invalidates(Resource::UserWorkouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::future::FutureExt;
    use serde_json::json;

    use crate::config::CacheConfig;
    use crate::executor::FetchFuture;
    use crate::key::KeyPattern;
    use crate::state::QueryStatus;
    use crate::transport::Transport;

    struct Fixture;

    impl Transport for Fixture {
        fn fetch(&self, key: &QueryKey) -> FetchFuture {
            let params: Vec<String> = key.params().iter().map(|p| p.to_string()).collect();
            async move { Ok(json!(params)) }.boxed()
        }

        fn send(&self, _operation: &str, input: Value) -> FetchFuture {
            async move { Ok(input) }.boxed()
        }
    }

    fn client() -> QueryClient {
        QueryClient::new(Arc::new(Fixture), CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_paginated_defaults() {
        let client = client().with_default_limit(25);
        let podiums = client.recent_podiums(None, None).expect("paginated");
        assert_eq!(podiums.key(), &QueryKey::recent_podiums(1, 25));

        let board = client.leaderboard(Some(3), Some(5)).expect("paginated");
        assert_eq!(board.key(), &QueryKey::leaderboard(3, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_id_keeps_query_idle() {
        let client = client();
        let mut run = client.run_detail(None);
        assert!(!run.is_enabled());
        assert_eq!(run.settled().await.status, QueryStatus::Idle);

        let mut blank = client.running_session(Some("  "));
        assert!(!blank.is_enabled());
        assert_eq!(blank.settled().await.status, QueryStatus::Idle);

        let mut session = client.running_session(Some("0xabc"));
        let state = session.settled().await;
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(json!(["0xabc"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_workout_patches_and_invalidates() {
        let client = client();
        client.fetch_query(&QueryKey::workout_history()).await;
        client.fetch_query(&QueryKey::user_workouts()).await;

        let changes = WorkoutUpdate {
            name: Some("Long run".to_string()),
            ..WorkoutUpdate::default()
        };
        client.update_workout("w1", &changes).await.expect("saved");

        assert_eq!(
            client.get_query_data(&QueryKey::workout("w1")),
            Some(json!({"id": "w1", "name": "Long run"}))
        );
        let history = client.read(&QueryKey::workout_history());
        assert_eq!(history.status, QueryStatus::Loading);
        assert!(history.data.is_some());
    }

    #[test]
    fn test_update_workout_mutation_effects() {
        let mutation = update_workout_mutation("w1");
        assert_eq!(mutation.operation(), UPDATE_WORKOUT);
        assert_eq!(
            mutation.affected(),
            &[
                KeyPattern::Resource(Resource::WorkoutHistory),
                KeyPattern::Resource(Resource::AllUserWorkouts),
                KeyPattern::Resource(Resource::UserWorkouts),
            ]
        );
    }
}
