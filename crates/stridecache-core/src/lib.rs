//! Query cache and invalidation engine.
//!
//! Mediates every read and write between UI code and remote services:
//!
//! - [`key`]: canonical, fixed-arity query keys per resource
//! - [`store`]: the process-wide entry store and its subscriptions
//! - [`executor`]: de-duplicated fetching with retry and observers
//! - [`pagination`]: page switching that keeps the last page visible
//! - [`mutation`]: writes plus the patches and invalidations they cause
//! - [`gc`]: staleness rules and retention-based eviction
//! - [`client`] and [`resources`]: the public entry point and per-resource helpers
//!
//! Transport is pluggable through [`transport::Transport`]; an HTTP
//! implementation over reqwest is included.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod gc;
pub mod key;
pub mod models;
pub mod mutation;
pub mod pagination;
pub mod resources;
pub mod retry;
pub mod settings;
pub mod state;
pub mod store;
pub mod transport;

pub use client::QueryClient;
pub use config::{CacheConfig, ResourcePolicy};
pub use error::{ErrorClass, KeyError, QueryError};
pub use executor::{fetcher, FetchFuture, Fetcher, QueryExecutor, QueryObserver};
pub use key::{KeyPart, KeyPattern, QueryKey, Resource};
pub use mutation::{Mutation, MutationCoordinator};
pub use pagination::PaginatedQuery;
pub use resources::update_workout_mutation;
pub use retry::{RetryAttempt, RetryPolicy};
pub use settings::Settings;
pub use state::{QueryState, QueryStatus};
pub use store::{CacheEntry, CacheStore, InvalidateMode, Subscription, WeakStore};
pub use transport::{HttpTransport, Transport};
