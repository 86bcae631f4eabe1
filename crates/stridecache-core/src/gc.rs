//! Staleness and garbage-collection rules.
//!
//! Entries are fresh until `stale_at = fetched_at + stale_time`. An entry
//! nobody observes is collectable once it has been unobserved for longer than
//! its resource's retention window. Sweeps run lazily on store access;
//! `spawn_sweeper` adds an optional timer on top.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::MAX_WINDOW;
use crate::store::{CacheEntry, WeakStore};

/// `fetched_at + stale_time`, capped at `MAX_WINDOW` past `fetched_at`.
pub fn stale_at(fetched_at: Instant, stale_time: Duration) -> Instant {
    fetched_at
        .checked_add(stale_time.min(MAX_WINDOW))
        .unwrap_or(fetched_at)
}

/// An entry that has never been fetched is always stale.
pub fn is_stale(stale_at: Option<Instant>, now: Instant) -> bool {
    stale_at.map_or(true, |at| now >= at)
}

pub fn is_collectable(entry: &CacheEntry, now: Instant, retention: Duration) -> bool {
    if entry.subscriber_count() > 0 || entry.in_flight_request_id().is_some() {
        return false;
    }
    entry
        .retired_at()
        .is_some_and(|retired| now.saturating_duration_since(retired) > retention)
}

/// Sweep `store` every `interval` until the store is dropped.
pub fn spawn_sweeper(store: WeakStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                debug!("Cache store dropped, stopping sweeper");
                return;
            };
            store.sweep();
        }
    })
}
