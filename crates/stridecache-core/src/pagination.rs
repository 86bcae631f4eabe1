//! Page-switching on top of the executor.
//!
//! Only the displayed state is affected: every page keeps its own cache entry.

use serde_json::Value;
use tracing::debug;

use crate::error::KeyError;
use crate::executor::{Fetcher, QueryExecutor, QueryObserver};
use crate::key::QueryKey;
use crate::state::QueryState;

/// Observer for a paginated list that keeps showing the last page while the
/// next one loads.
pub struct PaginatedQuery {
    observer: QueryObserver,
    /// Data of the page displayed before the last page change.
    previous: Option<Value>,
}

impl PaginatedQuery {
    pub fn new(
        executor: &QueryExecutor,
        key: QueryKey,
        fetcher: Fetcher,
    ) -> Result<Self, KeyError> {
        if !key.resource().is_paginated() {
            return Err(KeyError::NotPaginated(key.resource().name()));
        }
        Ok(Self {
            observer: executor.run(key, fetcher),
            previous: None,
        })
    }

    pub fn key(&self) -> &QueryKey {
        self.observer.key()
    }

    pub fn page(&self) -> u32 {
        self.key()
            .page()
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1)
    }

    /// Switch to `page`. The current data stays visible until `page` resolves.
    pub fn set_page(&mut self, page: u32) -> Result<(), KeyError> {
        let page = page.max(1);
        if page == self.page() {
            return Ok(());
        }
        let key = self.key().with_page(page)?;

        let shown = self.state();
        if shown.data.is_some() {
            self.previous = shown.data;
        }

        debug!(from = self.page(), to = page, resource = %key.resource(), "Changing page");
        let executor = self.observer.executor().clone();
        let fetcher = self.observer.fetcher().clone();
        // Replacing the observer releases the old page's subscription
        self.observer = executor.run(key, fetcher);
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<(), KeyError> {
        self.set_page(self.page().saturating_add(1))
    }

    pub fn prev_page(&mut self) -> Result<(), KeyError> {
        self.set_page(self.page().saturating_sub(1))
    }

    /// The displayed state: the current page's, or the previous page's data
    /// flagged as placeholder while the current page has nothing to show yet.
    pub fn state(&self) -> QueryState {
        self.with_placeholder(self.observer.state())
    }

    fn with_placeholder(&self, mut state: QueryState) -> QueryState {
        if state.data.is_none() && !state.is_settled() {
            if let Some(previous) = &self.previous {
                state.data = Some(previous.clone());
                state.is_placeholder = true;
            }
        }
        state
    }

    /// Wait for the next displayed state change.
    pub async fn next(&mut self) -> Option<QueryState> {
        let state = self.observer.next().await?;
        Some(self.display(state))
    }

    /// Wait until the current page settles.
    pub async fn settled(&mut self) -> QueryState {
        let state = self.observer.settled().await;
        self.display(state)
    }

    fn display(&mut self, state: QueryState) -> QueryState {
        if state.is_settled() {
            self.previous = None;
        }
        self.with_placeholder(state)
    }

    pub async fn refetch(&self) -> QueryState {
        self.observer.refetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::CacheConfig;
    use crate::executor::fetcher;
    use crate::state::QueryStatus;
    use crate::store::CacheStore;

    fn page_fetcher() -> Fetcher {
        fetcher(|key: QueryKey| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({"page": key.page()}))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_page_stays_visible() {
        let executor = QueryExecutor::new(CacheStore::new(CacheConfig::default()));
        let key = QueryKey::leaderboard(1, 10);
        let mut query = PaginatedQuery::new(&executor, key, page_fetcher()).expect("paginated");

        let first = query.settled().await;
        assert_eq!(first.data, Some(json!({"page": 1})));

        query.next_page().expect("page 2");
        assert_eq!(query.page(), 2);
        let loading = query.state();
        assert_eq!(loading.status, QueryStatus::Loading);
        assert!(loading.is_placeholder);
        assert_eq!(loading.data, Some(json!({"page": 1})));

        let second = query.settled().await;
        assert!(!second.is_placeholder);
        assert_eq!(second.data, Some(json!({"page": 2})));

        let page1 = executor.store().get(&QueryKey::leaderboard(1, 10)).expect("still cached");
        assert_eq!(page1.data, Some(json!({"page": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_page_shows_without_placeholder() {
        let executor = QueryExecutor::new(CacheStore::new(CacheConfig::default()));
        let key = QueryKey::recent_podiums(1, 10);
        let mut query = PaginatedQuery::new(&executor, key, page_fetcher()).expect("paginated");
        query.settled().await;
        query.set_page(2).expect("page 2");
        query.settled().await;

        query.prev_page().expect("page 1");
        let state = query.state();
        assert_eq!(state.status, QueryStatus::Success);
        assert!(!state.is_placeholder);
        assert_eq!(state.data, Some(json!({"page": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_unpaginated_keys() {
        let executor = QueryExecutor::new(CacheStore::new(CacheConfig::default()));
        assert!(matches!(
            PaginatedQuery::new(&executor, QueryKey::user_brands(), page_fetcher()),
            Err(KeyError::NotPaginated("userBrands"))
        ));
    }
}
