//! Query executor.
//!
//! Runs at most one fetch per key at a time, retries transient failures with
//! backoff, and writes outcomes into the store. Callers that arrive while a
//! fetch is in flight attach to it instead of issuing another request.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, Stream};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::QueryError;
use crate::key::QueryKey;
use crate::retry::RetryPolicy;
use crate::state::QueryState;
use crate::store::{CacheStore, FetchTicket, Subscription};

pub type FetchFuture = BoxFuture<'static, Result<Value, QueryError>>;

/// The remote read for a key.
pub type Fetcher = Arc<dyn Fn(QueryKey) -> FetchFuture + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, QueryError>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

#[derive(Clone, Debug)]
pub struct QueryExecutor {
    store: CacheStore,
}

impl QueryExecutor {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn dispatch(&self, key: &QueryKey, fetcher: &Fetcher, force: bool) -> FetchTicket {
        let retry = self.store.config().policy_for(key).retry;
        let store = self.store.clone();
        let fetch_key = key.clone();
        let fetch = Arc::clone(fetcher);

        let ticket = self.store.join_or_start(key, force, move |request_id| {
            async move {
                let result = fetch_with_retry(&store, &fetch_key, request_id, &fetch, retry).await;
                store.settle(&fetch_key, request_id, result)
            }
            .boxed()
        });

        match &ticket {
            FetchTicket::Started(future) => {
                debug!(key = %key, force, "Starting fetch");
                // Driven independently of callers so the result lands even if
                // every subscriber detaches
                tokio::spawn(future.clone());
            }
            FetchTicket::Joined(_) => debug!(key = %key, "Joining in-flight fetch"),
            FetchTicket::Fresh(_) => debug!(key = %key, "Cache hit"),
        }
        ticket
    }

    /// Return the current state immediately, starting a background fetch if
    /// the entry is missing, stale or failed. Old data stays in the returned state.
    pub fn read(&self, key: &QueryKey, fetcher: &Fetcher) -> QueryState {
        match self.dispatch(key, fetcher, false) {
            FetchTicket::Fresh(state) => state,
            FetchTicket::Joined(_) | FetchTicket::Started(_) => self.store.state(key),
        }
    }

    /// Wait for a settled state, using the cache when it is fresh.
    pub async fn fetch(&self, key: &QueryKey, fetcher: &Fetcher) -> QueryState {
        match self.dispatch(key, fetcher, false) {
            FetchTicket::Fresh(state) => state,
            FetchTicket::Joined(future) | FetchTicket::Started(future) => future.await,
        }
    }

    /// Revalidate even if the cached data is fresh. Joins a fetch already in flight.
    pub async fn refetch(&self, key: &QueryKey, fetcher: &Fetcher) -> QueryState {
        match self.dispatch(key, fetcher, true) {
            FetchTicket::Fresh(state) => state,
            FetchTicket::Joined(future) | FetchTicket::Started(future) => future.await,
        }
    }

    /// Warm the cache without waiting.
    pub fn prefetch(&self, key: &QueryKey, fetcher: &Fetcher) {
        self.dispatch(key, fetcher, false);
    }

    /// Subscribe to `key` and fetch it if needed.
    pub fn run(&self, key: QueryKey, fetcher: Fetcher) -> QueryObserver {
        self.observe(key, fetcher, true)
    }

    /// Like [`run`](Self::run), but a disabled observer never fetches.
    pub fn observe(&self, key: QueryKey, fetcher: Fetcher, enabled: bool) -> QueryObserver {
        let subscription = self.store.subscribe(&key);
        if enabled {
            self.dispatch(&key, &fetcher, false);
        }
        QueryObserver {
            executor: self.clone(),
            key,
            fetcher,
            enabled,
            subscription,
        }
    }
}

async fn fetch_with_retry(
    store: &CacheStore,
    key: &QueryKey,
    request_id: u64,
    fetcher: &Fetcher,
    retry: RetryPolicy,
) -> Result<Value, QueryError> {
    let mut attempt_index = 0;
    loop {
        let error = match fetcher(key.clone()).await {
            Ok(data) => return Ok(data),
            Err(error) => error,
        };

        let Some(attempt) = retry.next_attempt(&error, attempt_index) else {
            if error.is_not_found() {
                debug!(key = %key, request_id, "Resource not found, not retrying");
            } else {
                error!(
                    key = %key,
                    request_id,
                    attempts = attempt_index + 1,
                    error = %error,
                    "Fetch failed"
                );
            }
            return Err(error);
        };

        warn!(
            key = %key,
            request_id,
            attempt = attempt.attempt_index,
            delay_ms = attempt.next_delay_ms,
            error = %error,
            "Fetch failed, retrying"
        );
        store.record_failure(key, request_id, &attempt);
        tokio::time::sleep(retry.delay(attempt_index)).await;
        attempt_index += 1;
    }
}

/// A consumer's live view of one key.
///
/// Dropping the observer unsubscribes; a fetch it started still completes and
/// lands in the cache.
pub struct QueryObserver {
    executor: QueryExecutor,
    key: QueryKey,
    fetcher: Fetcher,
    enabled: bool,
    subscription: Subscription,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> QueryState {
        self.subscription.current()
    }

    /// Wait for the next state change.
    ///
    /// An invalidation of the observed key triggers a refetch here, so the
    /// state returned is already `Loading`.
    pub async fn next(&mut self) -> Option<QueryState> {
        let state = self.subscription.changed().await?;
        Some(self.refresh_if_invalidated(state))
    }

    fn refresh_if_invalidated(&mut self, state: QueryState) -> QueryState {
        let wants_fetch = state.is_invalidated || state.is_idle();
        if !self.enabled || state.is_fetching || !wants_fetch {
            return state;
        }
        debug!(key = %self.key, "Observed key invalidated, refetching");
        match self.executor.dispatch(&self.key, &self.fetcher, false) {
            FetchTicket::Fresh(state) => state,
            FetchTicket::Joined(_) | FetchTicket::Started(_) => self.subscription.latest(),
        }
    }

    /// Wait until the current fetch (if any) settles.
    pub async fn settled(&mut self) -> QueryState {
        let latest = self.subscription.latest();
        let mut state = self.refresh_if_invalidated(latest);
        loop {
            if !state.is_fetching && (state.is_settled() || !self.enabled) {
                return state;
            }
            match self.next().await {
                Some(next) => state = next,
                None => return self.state(),
            }
        }
    }

    /// Force a revalidation and wait for it.
    pub async fn refetch(&self) -> QueryState {
        self.executor.refetch(&self.key, &self.fetcher).await
    }

    /// Flip the enable guard; enabling fetches if the entry needs it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.executor.dispatch(&self.key, &self.fetcher, false);
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn into_stream(self) -> impl Stream<Item = QueryState> {
        stream::unfold(self, |mut observer| async move {
            let state = observer.next().await?;
            Some((state, observer))
        })
    }

    pub(crate) fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub(crate) fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}
