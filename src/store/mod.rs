//! Shared rate-limit state and the stores that hold it.
//!
//! A store is a dumb TTL-respecting map. Every process pointed at the same
//! backend and key sees the same [`RateLimitState`]; writes are last-writer-wins.

mod file;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use file::FileStore;
pub use memory::InMemoryStore;

/// Quota observed from the API, as last written by any process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitState {
    pub fn new(remaining: u32, reset_time: DateTime<Utc>) -> Self {
        Self {
            remaining,
            reset_time,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value contract consumed by the rate-limit tracker.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RateLimitState>, StoreError>;

    /// Entries must stop being returned once `ttl` has elapsed.
    async fn set(&self, key: &str, state: &RateLimitState, ttl: Duration)
        -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
