//! Writes and the cache effects of a successful write.

use std::fmt;
use std::future::Future;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::QueryError;
use crate::key::{KeyPattern, QueryKey};
use crate::store::{CacheStore, InvalidateMode};

type Updater = Box<dyn FnOnce(Option<&Value>, &Value) -> Value + Send>;

/// A direct write of a computed value into one key.
struct Patch {
    key: QueryKey,
    /// `(cached data, mutation result) -> new data`
    updater: Updater,
}

/// A named remote write plus the patches and invalidations it causes.
pub struct Mutation {
    operation: String,
    patches: Vec<Patch>,
    invalidates: Vec<KeyPattern>,
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("operation", &self.operation)
            .field("patches", &self.patched())
            .field("invalidates", &self.invalidates)
            .finish()
    }
}

impl Mutation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            patches: Vec::new(),
            invalidates: Vec::new(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Mark every entry matching `pattern` stale once the write succeeds.
    pub fn invalidates(mut self, pattern: impl Into<KeyPattern>) -> Self {
        self.invalidates.push(pattern.into());
        self
    }

    /// Compute `key`'s new data from its cached data and the write's result.
    pub fn patch<F>(mut self, key: QueryKey, updater: F) -> Self
    where
        F: FnOnce(Option<&Value>, &Value) -> Value + Send + 'static,
    {
        self.patches.push(Patch {
            key,
            updater: Box::new(updater),
        });
        self
    }

    /// Store the write's result as `key`'s data.
    pub fn replace(self, key: QueryKey) -> Self {
        self.patch(key, |_, result| result.clone())
    }

    pub fn affected(&self) -> &[KeyPattern] {
        &self.invalidates
    }

    /// Keys written directly on success.
    pub fn patched(&self) -> Vec<&QueryKey> {
        self.patches.iter().map(|p| &p.key).collect()
    }
}

/// Runs writes and applies their declared cache effects. Never retries.
#[derive(Clone, Debug)]
pub struct MutationCoordinator {
    store: CacheStore,
}

impl MutationCoordinator {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Run `op(input)`. On success apply the patches, then invalidate the
    /// affected patterns. On failure the cache is untouched.
    pub async fn mutate<I, F, Fut>(
        &self,
        mutation: Mutation,
        input: I,
        op: F,
    ) -> Result<Value, QueryError>
    where
        F: FnOnce(I) -> Fut,
        Fut: Future<Output = Result<Value, QueryError>>,
    {
        let result = match op(input).await {
            Ok(result) => result,
            Err(error) => {
                warn!(operation = %mutation.operation, error = %error, "Mutation failed");
                return Err(error);
            }
        };

        let Mutation {
            operation,
            patches,
            invalidates,
        } = mutation;

        let patched = patches.len();
        for Patch { key, updater } in patches {
            self.store
                .set_query_data(&key, |cached| updater(cached, &result));
        }

        let mut stale = 0;
        for pattern in &invalidates {
            stale += self.store.invalidate(pattern, InvalidateMode::MarkStale);
        }

        info!(operation = %operation, patched, stale, "Mutation applied");
        Ok(result)
    }
}
