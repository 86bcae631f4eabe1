//! Remote transport boundary.
//!
//! The cache never talks to the network itself; it calls a [`Transport`] for
//! reads keyed by [`QueryKey`] and for named write operations.

pub mod http;

use serde_json::Value;

use crate::executor::FetchFuture;
use crate::key::QueryKey;

pub use http::HttpTransport;

pub trait Transport: Send + Sync {
    /// Read the resource `key` identifies.
    fn fetch(&self, key: &QueryKey) -> FetchFuture;

    /// Perform the write `operation` with `input`.
    fn send(&self, operation: &str, input: Value) -> FetchFuture;
}
