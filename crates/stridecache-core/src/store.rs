//! Cache entry store.
//!
//! The store owns every cache entry. Other components hold a cheap clone of
//! `CacheStore` and issue commands against it; every command is a short
//! synchronous critical section that never spans an await.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::QueryError;
use crate::gc;
use crate::key::{KeyPattern, QueryKey};
use crate::retry::RetryAttempt;
use crate::state::{QueryState, QueryStatus};

/// An in-flight fetch that later callers can attach to.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, QueryState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateMode {
    /// Keep serving the data but force the next read to revalidate.
    MarkStale,
    /// Drop the entry; the next read starts from `Idle`.
    Evict,
}

/// Cached state for one query key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub status: QueryStatus,
    pub fetched_at: Option<Instant>,
    pub stale_at: Option<Instant>,
    /// Wall-clock time of the last successful write, for display.
    pub updated_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub last_retry: Option<RetryAttempt>,
    pub invalidated: bool,
    retired_at: Option<Instant>,
    subscriber_count: usize,
    in_flight_request_id: Option<u64>,
}

impl CacheEntry {
    fn new(key: QueryKey, now: Instant) -> Self {
        Self {
            key,
            data: None,
            error: None,
            status: QueryStatus::Idle,
            fetched_at: None,
            stale_at: None,
            updated_at: None,
            failure_count: 0,
            last_retry: None,
            invalidated: false,
            retired_at: Some(now),
            subscriber_count: 0,
            in_flight_request_id: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    /// When the entry last lost its final subscriber; `None` while observed.
    pub fn retired_at(&self) -> Option<Instant> {
        self.retired_at
    }

    pub fn in_flight_request_id(&self) -> Option<u64> {
        self.in_flight_request_id
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        gc::is_stale(self.stale_at, now)
    }

    /// Whether a plain read should start a fetch.
    pub fn needs_fetch(&self, now: Instant) -> bool {
        matches!(self.status, QueryStatus::Idle | QueryStatus::Error) || self.is_stale(now)
    }

    pub fn set_success(&mut self, data: Value, now: Instant, stale_time: Duration) {
        self.data = Some(data);
        self.error = None;
        self.status = QueryStatus::Success;
        self.fetched_at = Some(now);
        self.stale_at = Some(gc::stale_at(now, stale_time));
        self.updated_at = Some(Utc::now());
        self.failure_count = 0;
        self.last_retry = None;
        self.invalidated = false;
    }

    /// Previous data, if any, is kept alongside the error.
    pub fn set_error(&mut self, error: QueryError) {
        self.error = Some(error);
        self.status = QueryStatus::Error;
        self.failure_count += 1;
        self.last_retry = None;
    }

    pub fn mark_stale(&mut self, now: Instant) {
        if let Some(fetched_at) = self.fetched_at {
            self.stale_at = Some(now.max(fetched_at));
        }
        self.invalidated = true;
    }

    pub(crate) fn snapshot(&self, now: Instant) -> QueryState {
        QueryState {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.in_flight_request_id.is_some(),
            is_stale: self.is_stale(now),
            is_invalidated: self.invalidated,
            is_placeholder: false,
            failure_count: self.failure_count,
            updated_at: self.updated_at,
        }
    }
}

struct InFlight {
    request_id: u64,
    future: SharedFetch,
}

struct Slot {
    entry: CacheEntry,
    in_flight: Option<InFlight>,
    notify: watch::Sender<QueryState>,
    /// Requests issued before this generation belong to an evicted incarnation.
    created_generation: u64,
    /// Newest request generation whose result has been applied.
    resolved_generation: u64,
    /// Requests issued before this generation started ahead of the last
    /// MarkStale and land already stale.
    invalidated_generation: u64,
}

impl Slot {
    fn new(key: QueryKey, now: Instant, generation: u64) -> Self {
        let entry = CacheEntry::new(key, now);
        let (notify, _) = watch::channel(entry.snapshot(now));
        Self {
            entry,
            in_flight: None,
            notify,
            created_generation: generation,
            resolved_generation: 0,
            invalidated_generation: 0,
        }
    }

    fn publish(&self, now: Instant) {
        self.notify.send_replace(self.entry.snapshot(now));
    }

    /// Start over from `Idle` while keeping subscribers attached.
    fn reset(&mut self, now: Instant, generation: u64) {
        let subscribers = self.entry.subscriber_count;
        self.entry = CacheEntry::new(self.entry.key.clone(), now);
        self.entry.subscriber_count = subscribers;
        if subscribers > 0 {
            self.entry.retired_at = None;
        }
        self.entry.invalidated = true;
        self.in_flight = None;
        self.created_generation = generation;
    }
}

struct StoreState {
    slots: HashMap<QueryKey, Slot>,
    next_generation: u64,
}

impl StoreState {
    fn slot(&mut self, key: &QueryKey, now: Instant) -> &mut Slot {
        let generation = self.next_generation;
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone(), now, generation))
    }

    fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn sweep(&mut self, config: &CacheConfig, now: Instant) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, slot| {
            let retention = config.policy_for(key).retention;
            let collect = slot.in_flight.is_none() && gc::is_collectable(&slot.entry, now, retention);
            if collect {
                debug!(key = %key, "Evicting unused cache entry");
            }
            !collect
        });
        before - self.slots.len()
    }
}

/// Outcome of asking the store to fetch a key.
pub(crate) enum FetchTicket {
    /// Cached data is fresh; nothing started.
    Fresh(QueryState),
    /// Attached to a fetch already in flight.
    Joined(SharedFetch),
    /// A new fetch was registered; the caller must drive it.
    Started(SharedFetch),
}

struct StoreInner {
    state: Mutex<StoreState>,
    config: CacheConfig,
}

/// Process-wide cache of query results.
///
/// Clone is cheap - all clones share one set of entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState {
                    slots: HashMap::new(),
                    next_generation: 1,
                }),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, StoreState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned cache lock"
                );
                poisoned.into_inner()
            }
        }
    }

    /// Look up an entry. Expired unobserved entries are swept first.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut state = self.lock("get");
        state.sweep(&self.inner.config, now);
        state.slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Consumer view of a key; `Idle` if nothing is cached.
    pub fn state(&self, key: &QueryKey) -> QueryState {
        let now = Instant::now();
        let mut state = self.lock("state");
        state.sweep(&self.inner.config, now);
        state
            .slots
            .get(key)
            .map(|slot| slot.entry.snapshot(now))
            .unwrap_or_else(QueryState::idle)
    }

    /// Apply `mutator` to the entry for `key`, creating it if needed, and notify subscribers.
    pub fn upsert<F>(&self, key: &QueryKey, mutator: F)
    where
        F: FnOnce(&mut CacheEntry),
    {
        let now = Instant::now();
        let mut state = self.lock("upsert");
        let slot = state.slot(key, now);
        mutator(&mut slot.entry);
        slot.publish(now);
    }

    /// Write a known-correct value directly, as if it had just been fetched.
    ///
    /// Counts as a resolved request generation, so a fetch that was already in
    /// flight for `key` cannot overwrite it when it lands.
    pub fn set_query_data<F>(&self, key: &QueryKey, updater: F)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let now = Instant::now();
        let stale_time = self.inner.config.policy_for(key).stale_time;
        let mut state = self.lock("set_query_data");
        state.slot(key, now);
        let generation = state.issue_generation();
        let slot = state.slot(key, now);
        let data = updater(slot.entry.data.as_ref());
        slot.entry.set_success(data, now, stale_time);
        slot.resolved_generation = generation;
        slot.publish(now);
        debug!(key = %key, "Patched cache entry");
    }

    /// Mark stale or evict every entry matching `pattern`. Returns how many matched.
    pub fn invalidate(&self, pattern: &KeyPattern, mode: InvalidateMode) -> usize {
        let now = Instant::now();
        let mut guard = self.lock("invalidate");
        let state = &mut *guard;
        let generation = state.next_generation;

        let mut affected = 0;
        let mut evicted = Vec::new();
        for (key, slot) in state.slots.iter_mut().filter(|(k, _)| pattern.matches(k)) {
            affected += 1;
            match mode {
                InvalidateMode::MarkStale => {
                    slot.entry.mark_stale(now);
                    slot.invalidated_generation = generation;
                    slot.publish(now);
                }
                // Observed entries are reset in place so their subscribers hear about it
                InvalidateMode::Evict if slot.entry.subscriber_count > 0 => {
                    slot.reset(now, generation);
                    slot.publish(now);
                }
                InvalidateMode::Evict => evicted.push(key.clone()),
            }
        }
        for key in &evicted {
            state.slots.remove(key);
        }

        info!(pattern = %pattern, ?mode, affected, "Invalidated cache entries");
        affected
    }

    /// Attach a subscriber to `key`, creating the entry if needed.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription {
        let now = Instant::now();
        let mut state = self.lock("subscribe");
        let slot = state.slot(key, now);
        slot.entry.subscriber_count += 1;
        slot.entry.retired_at = None;
        let receiver = slot.notify.subscribe();
        drop(state);

        Subscription {
            key: key.clone(),
            receiver,
            store: self.clone(),
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    fn release(&self, key: &QueryKey) {
        let now = Instant::now();
        let mut state = self.lock("release");
        if let Some(slot) = state.slots.get_mut(key) {
            slot.entry.subscriber_count = slot.entry.subscriber_count.saturating_sub(1);
            if slot.entry.subscriber_count == 0 {
                slot.entry.retired_at = Some(now);
            }
        }
    }

    /// Evict unobserved entries past their retention window. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let evicted = self.lock("sweep").sweep(&self.inner.config, now);
        if evicted > 0 {
            info!(evicted, "Swept expired cache entries");
        }
        evicted
    }

    /// Drop everything; observed entries are reset to `Idle` instead.
    pub fn clear(&self) {
        let now = Instant::now();
        let mut guard = self.lock("clear");
        let state = &mut *guard;
        let generation = state.next_generation;
        state.slots.retain(|_, slot| slot.entry.subscriber_count > 0);
        for slot in state.slots.values_mut() {
            slot.reset(now, generation);
            slot.publish(now);
        }
    }

    pub fn len(&self) -> usize {
        self.lock("len").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.lock("keys").slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore(Arc::downgrade(&self.inner))
    }

    // Fetch bookkeeping, driven by the executor.

    /// Join the in-flight fetch for `key`, report it fresh, or register a new
    /// fetch built by `start` from its request id.
    pub(crate) fn join_or_start<F>(&self, key: &QueryKey, force: bool, start: F) -> FetchTicket
    where
        F: FnOnce(u64) -> BoxFuture<'static, QueryState>,
    {
        let now = Instant::now();
        let mut state = self.lock("join_or_start");
        state.sweep(&self.inner.config, now);

        if let Some(in_flight) = state.slots.get(key).and_then(|s| s.in_flight.as_ref()) {
            return FetchTicket::Joined(in_flight.future.clone());
        }

        let slot = state.slot(key, now);
        if !force && !slot.entry.needs_fetch(now) {
            return FetchTicket::Fresh(slot.entry.snapshot(now));
        }

        let request_id = state.issue_generation();
        let slot = state.slot(key, now);
        let future = start(request_id).shared();
        slot.in_flight = Some(InFlight {
            request_id,
            future: future.clone(),
        });
        slot.entry.in_flight_request_id = Some(request_id);
        slot.entry.status = QueryStatus::Loading;
        slot.entry.invalidated = false;
        slot.publish(now);
        FetchTicket::Started(future)
    }

    /// Note a failed attempt that is about to be retried. Status stays `Loading`.
    pub(crate) fn record_failure(&self, key: &QueryKey, request_id: u64, attempt: &RetryAttempt) {
        let now = Instant::now();
        let mut state = self.lock("record_failure");
        if let Some(slot) = state.slots.get_mut(key) {
            if slot.entry.in_flight_request_id == Some(request_id) {
                slot.entry.failure_count += 1;
                slot.entry.last_retry = Some(attempt.clone());
                slot.publish(now);
            }
        }
    }

    /// Apply the outcome of request `request_id`, unless a newer generation
    /// already resolved or the entry was evicted since it was issued.
    pub(crate) fn settle(
        &self,
        key: &QueryKey,
        request_id: u64,
        result: Result<Value, QueryError>,
    ) -> QueryState {
        let now = Instant::now();
        let stale_time = self.inner.config.policy_for(key).stale_time;
        let mut state = self.lock("settle");

        let Some(slot) = state.slots.get_mut(key) else {
            debug!(key = %key, request_id, "Entry evicted while fetching, dropping result");
            return QueryState::from_result(result);
        };

        if slot.in_flight.as_ref().is_some_and(|f| f.request_id == request_id) {
            slot.in_flight = None;
            slot.entry.in_flight_request_id = None;
        }

        if request_id < slot.created_generation || request_id <= slot.resolved_generation {
            warn!(
                key = %key,
                request_id,
                resolved = slot.resolved_generation,
                "Discarding late response superseded by a newer one"
            );
            slot.publish(now);
            return slot.entry.snapshot(now);
        }

        slot.resolved_generation = request_id;
        match result {
            Ok(data) => slot.entry.set_success(data, now, stale_time),
            Err(error) => slot.entry.set_error(error),
        }
        if request_id < slot.invalidated_generation {
            debug!(key = %key, request_id, "Result predates an invalidation, keeping it stale");
            slot.entry.mark_stale(now);
        }
        if slot.entry.subscriber_count == 0 {
            slot.entry.retired_at = Some(now);
        }
        slot.publish(now);
        slot.entry.snapshot(now)
    }
}

/// Non-owning handle used by background tasks that must not keep the store alive.
#[derive(Clone)]
pub struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub fn upgrade(&self) -> Option<CacheStore> {
        self.0.upgrade().map(|inner| CacheStore { inner })
    }
}

/// A live subscription to one key. Dropping it unsubscribes.
pub struct Subscription {
    key: QueryKey,
    receiver: watch::Receiver<QueryState>,
    store: CacheStore,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The most recent state, without consuming the change notification.
    pub fn current(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    /// The most recent state, marking it seen.
    pub(crate) fn latest(&mut self) -> QueryState {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Option<QueryState> {
        self.receiver.changed().await.ok()?;
        Some(self.latest())
    }

    pub fn into_stream(self) -> impl Stream<Item = QueryState> {
        stream::unfold(self, |mut sub| async move {
            let state = sub.changed().await?;
            Some((state, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Resource;
    use serde_json::json;

    fn store() -> CacheStore {
        CacheStore::new(CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_query_data_creates_fresh_entry() {
        let store = store();
        let key = QueryKey::workout("w1");

        store.set_query_data(&key, |_| json!({"id": "w1"}));

        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.data, Some(json!({"id": "w1"})));
        assert!(entry.fetched_at.is_some());
        assert!(entry.stale_at >= entry.fetched_at);
        assert!(!entry.is_stale(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_stale_keeps_data() {
        let store = store();
        store.set_query_data(&QueryKey::all_user_workouts(1, 10), |_| json!([1]));
        store.set_query_data(&QueryKey::all_user_workouts(2, 10), |_| json!([2]));
        store.set_query_data(&QueryKey::user_workouts(), |_| json!([3]));

        let affected = store.invalidate(
            &KeyPattern::Resource(Resource::AllUserWorkouts),
            InvalidateMode::MarkStale,
        );
        assert_eq!(affected, 2);

        let now = Instant::now();
        let page1 = store.get(&QueryKey::all_user_workouts(1, 10)).expect("kept");
        assert!(page1.is_stale(now));
        assert!(page1.invalidated);
        assert_eq!(page1.data, Some(json!([1])));
        assert!(!store.get(&QueryKey::user_workouts()).expect("kept").is_stale(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_removes_unobserved_entry() {
        let store = store();
        let key = QueryKey::user_brands();
        store.set_query_data(&key, |_| json!([]));

        store.invalidate(&KeyPattern::Exact(key.clone()), InvalidateMode::Evict);
        assert!(store.get(&key).is_none());
        assert_eq!(store.state(&key).status, QueryStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_resets_observed_entry_and_notifies() {
        let store = store();
        let key = QueryKey::user_brands();
        store.set_query_data(&key, |_| json!(["a"]));
        let mut sub = store.subscribe(&key);

        store.invalidate(&KeyPattern::Exact(key.clone()), InvalidateMode::Evict);

        let state = sub.changed().await.expect("notified");
        assert_eq!(state.status, QueryStatus::Idle);
        assert_eq!(state.data, None);
        assert!(state.is_invalidated);
        assert_eq!(store.get(&key).expect("still present").subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_counts_and_retirement() {
        let store = store();
        let key = QueryKey::leaderboard(1, 10);

        let a = store.subscribe(&key);
        let b = store.subscribe(&key);
        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.subscriber_count(), 2);
        assert!(entry.retired_at().is_none());

        store.unsubscribe(a);
        assert_eq!(store.get(&key).expect("entry").subscriber_count(), 1);

        drop(b);
        let entry = store.get(&key).expect("entry");
        assert_eq!(entry.subscriber_count(), 0);
        assert!(entry.retired_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_subscribers_and_retention() {
        let store = store();
        let observed = QueryKey::run_detail("r1");
        let idle = QueryKey::run_detail("r2");
        store.set_query_data(&observed, |_| json!({}));
        store.set_query_data(&idle, |_| json!({}));
        let _sub = store.subscribe(&observed);

        // runDetail retention is ten minutes
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(store.sweep(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.sweep(), 1);
        assert!(store.get(&idle).is_none());
        assert!(store.get(&observed).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_notifies_subscribers() {
        let store = store();
        let key = QueryKey::workout_history();
        let mut sub = store.subscribe(&key);

        store.upsert(&key, |entry| entry.set_error(QueryError::RateLimited));

        let state = sub.changed().await.expect("notified");
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.error, Some(QueryError::RateLimited));
        assert_eq!(state.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_stale_during_fetch_survives_settle() {
        let store = store();
        let key = QueryKey::workout_history();
        let ticket = store.join_or_start(&key, false, |_| async { QueryState::idle() }.boxed());
        let FetchTicket::Started(_) = ticket else {
            panic!("expected a new fetch");
        };
        let request_id = store.get(&key).and_then(|e| e.in_flight_request_id()).expect("in flight");

        store.invalidate(
            &KeyPattern::Resource(Resource::WorkoutHistory),
            InvalidateMode::MarkStale,
        );
        let state = store.settle(&key, request_id, Ok(json!(["pre-write"])));

        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(json!(["pre-write"])));
        assert!(state.is_stale);
        assert!(state.is_invalidated);
        assert!(store.get(&key).expect("entry").needs_fetch(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_keeps_observed_entries() {
        let store = store();
        let observed = QueryKey::user_brands();
        store.set_query_data(&observed, |_| json!([]));
        store.set_query_data(&QueryKey::workout_history(), |_| json!([]));
        let _sub = store.subscribe(&observed);

        store.clear();

        assert_eq!(store.keys(), vec![observed.clone()]);
        assert_eq!(store.state(&observed).status, QueryStatus::Idle);
    }
}
