//! Client for the Vectorify API.
//!
//! Calls go through a [`retry::RetryCoordinator`] that retries 429s, 5xx and
//! transport failures a bounded number of times, and a
//! [`rate_limit::RateLimitTracker`] that shares the last observed quota with
//! other processes through a [`store::RateLimitStore`].

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod types;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use store::{FileStore, InMemoryStore, RateLimitState, RateLimitStore};
pub use tokio_util::sync::CancellationToken;
