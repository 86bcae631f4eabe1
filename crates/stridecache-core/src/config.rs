//! Per-resource freshness, retention and retry configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::key::{QueryKey, Resource};
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, EXTERNAL_ID_MAX_RETRIES};

const TWO_MINUTES: Duration = Duration::from_secs(2 * 60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);

/// Freshness window for resources without an explicit one.
pub const DEFAULT_STALE_TIME: Duration = FIVE_MINUTES;

/// How long an unobserved entry survives when a resource sets no retention.
pub const DEFAULT_RETENTION: Duration = FIVE_MINUTES;

/// Longest freshness or retention window a policy may carry.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub stale_time: Duration,
    pub retention: Duration,
    pub retry: RetryPolicy,
}

impl ResourcePolicy {
    pub const fn new(stale_time: Duration, retention: Duration, max_retries: u32) -> Self {
        Self {
            stale_time,
            retention,
            retry: RetryPolicy::new(max_retries),
        }
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIME, DEFAULT_RETENTION, DEFAULT_MAX_RETRIES)
    }
}

/// The cache's policy table.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    policies: HashMap<Resource, ResourcePolicy>,
    fallback: ResourcePolicy,
    /// Interval for the background sweeper; `None` means sweep lazily on access only.
    pub gc_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let policies = HashMap::from([
            (
                Resource::RecentPodiums,
                ResourcePolicy::new(TWO_MINUTES, DEFAULT_RETENTION, DEFAULT_MAX_RETRIES),
            ),
            (
                Resource::AllUserWorkouts,
                ResourcePolicy::new(FIVE_MINUTES, DEFAULT_RETENTION, 2),
            ),
            (
                Resource::RunDetail,
                ResourcePolicy::new(FIVE_MINUTES, TEN_MINUTES, 2),
            ),
            (
                Resource::RunningSession,
                ResourcePolicy::new(FIVE_MINUTES, TEN_MINUTES, EXTERNAL_ID_MAX_RETRIES),
            ),
            (
                Resource::UserBrands,
                ResourcePolicy::new(FIVE_MINUTES, TEN_MINUTES, DEFAULT_MAX_RETRIES),
            ),
            (
                Resource::Leaderboard,
                ResourcePolicy::new(FIVE_MINUTES, DEFAULT_RETENTION, DEFAULT_MAX_RETRIES),
            ),
        ]);

        Self {
            policies,
            fallback: ResourcePolicy::default(),
            gc_interval: None,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self, resource: Resource) -> &ResourcePolicy {
        self.policies.get(&resource).unwrap_or(&self.fallback)
    }

    pub fn policy_for(&self, key: &QueryKey) -> &ResourcePolicy {
        self.policy(key.resource())
    }

    pub fn policy_mut(&mut self, resource: Resource) -> &mut ResourcePolicy {
        let fallback = self.fallback;
        self.policies.entry(resource).or_insert(fallback)
    }

    pub fn with_policy(mut self, resource: Resource, policy: ResourcePolicy) -> Self {
        self.policies.insert(resource, policy);
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = Some(interval);
        self
    }
}
