//! The cache's public entry point.
//!
//! `QueryClient` bundles one store with the executor, the mutation
//! coordinator and a transport. Create one per process and pass it around;
//! clones share everything.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::CacheConfig;
use crate::error::{KeyError, QueryError};
use crate::executor::{Fetcher, QueryExecutor, QueryObserver};
use crate::gc;
use crate::key::{KeyPattern, QueryKey};
use crate::mutation::{Mutation, MutationCoordinator};
use crate::pagination::PaginatedQuery;
use crate::settings::{Settings, DEFAULT_PAGE_LIMIT};
use crate::state::QueryState;
use crate::store::{CacheStore, InvalidateMode};
use crate::transport::{HttpTransport, Transport};

#[derive(Clone)]
pub struct QueryClient {
    store: CacheStore,
    executor: QueryExecutor,
    mutations: MutationCoordinator,
    transport: Arc<dyn Transport>,
    default_limit: u32,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("store", &self.store)
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    pub fn new(transport: Arc<dyn Transport>, config: CacheConfig) -> Self {
        let store = CacheStore::new(config);
        Self {
            executor: QueryExecutor::new(store.clone()),
            mutations: MutationCoordinator::new(store.clone()),
            store,
            transport,
            default_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// An HTTP-backed client configured from user settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transport = HttpTransport::new(&settings.base_url, settings.request_timeout())?;
        info!(base_url = %settings.base_url, "Creating query client");
        let client = Self::new(Arc::new(transport), settings.cache_config());
        Ok(client.with_default_limit(settings.default_page_limit))
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Reads through the transport.
    pub fn fetcher(&self) -> Fetcher {
        let transport = Arc::clone(&self.transport);
        Arc::new(move |key: QueryKey| transport.fetch(&key))
    }

    /// Observe `key`, fetching it if needed.
    pub fn query(&self, key: QueryKey) -> QueryObserver {
        self.executor.run(key, self.fetcher())
    }

    /// Observe `key`; while `enabled` is false nothing is fetched.
    pub fn query_when(&self, key: QueryKey, enabled: bool) -> QueryObserver {
        self.executor.observe(key, self.fetcher(), enabled)
    }

    pub fn paginated(&self, key: QueryKey) -> Result<PaginatedQuery, KeyError> {
        PaginatedQuery::new(&self.executor, key, self.fetcher())
    }

    /// The current state, starting a background fetch if it is needed.
    pub fn read(&self, key: &QueryKey) -> QueryState {
        self.executor.read(key, &self.fetcher())
    }

    /// Fetch unless fresh, and wait for the result.
    pub async fn fetch_query(&self, key: &QueryKey) -> QueryState {
        self.executor.fetch(key, &self.fetcher()).await
    }

    pub async fn refetch(&self, key: &QueryKey) -> QueryState {
        self.executor.refetch(key, &self.fetcher()).await
    }

    pub fn prefetch(&self, key: &QueryKey) {
        self.executor.prefetch(key, &self.fetcher());
    }

    /// Cached data, without fetching.
    pub fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.store.get(key).and_then(|entry| entry.data)
    }

    pub fn set_query_data<F>(&self, key: &QueryKey, updater: F)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.store.set_query_data(key, updater);
    }

    pub fn invalidate(&self, pattern: impl Into<KeyPattern>, mode: InvalidateMode) -> usize {
        self.store.invalidate(&pattern.into(), mode)
    }

    /// Send the write through the transport and apply its cache effects.
    pub async fn mutate(&self, mutation: Mutation, input: Value) -> Result<Value, QueryError> {
        let transport = Arc::clone(&self.transport);
        let operation = mutation.operation().to_string();
        self.mutations
            .mutate(mutation, input, move |input| transport.send(&operation, input))
            .await
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Start the timer sweeper if the config asks for one.
    pub fn spawn_gc(&self) -> Option<JoinHandle<()>> {
        let interval = self.store.config().gc_interval?;
        Some(gc::spawn_sweeper(self.store.downgrade(), interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::FutureExt;
    use serde_json::json;

    use crate::executor::FetchFuture;
    use crate::key::Resource;

    #[derive(Default)]
    struct EchoTransport {
        reads: AtomicUsize,
    }

    impl Transport for EchoTransport {
        fn fetch(&self, key: &QueryKey) -> FetchFuture {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let key = key.to_string();
            async move { Ok(json!({ "key": key })) }.boxed()
        }

        fn send(&self, operation: &str, input: Value) -> FetchFuture {
            let operation = operation.to_string();
            async move { Ok(json!({ "op": operation, "input": input })) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_query_caches() {
        let transport = Arc::new(EchoTransport::default());
        let client = QueryClient::new(transport.clone(), CacheConfig::default());
        let key = QueryKey::user_brands();

        let state = client.fetch_query(&key).await;
        assert_eq!(state.data, Some(json!({"key": r#"["userBrands"]"#})));
        client.fetch_query(&key).await;
        assert_eq!(transport.reads.load(Ordering::SeqCst), 1);
        assert_eq!(client.get_query_data(&key), state.data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_goes_through_transport() {
        let client = QueryClient::new(Arc::new(EchoTransport::default()), CacheConfig::default());
        let result = client
            .mutate(
                Mutation::new("updateWorkout").invalidates(Resource::WorkoutHistory),
                json!({"id": "w1"}),
            )
            .await
            .expect("succeeds");
        assert_eq!(result["op"], "updateWorkout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_gc_only_when_configured() {
        let transport: Arc<dyn Transport> = Arc::new(EchoTransport::default());
        let lazy = QueryClient::new(Arc::clone(&transport), CacheConfig::default());
        assert!(lazy.spawn_gc().is_none());

        let timed = QueryClient::new(
            transport,
            CacheConfig::default().with_gc_interval(Duration::from_secs(30)),
        );
        let handle = timed.spawn_gc().expect("sweeper");
        handle.abort();
    }
}
