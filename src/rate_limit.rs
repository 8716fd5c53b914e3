//! Cross-process rate-limit tracking.
//!
//! The tracker keeps the last quota the API reported in a shared store and
//! slows callers down as the quota runs out. Store failures never reach the
//! caller: without a readable store the tracker simply stops coordinating.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::{rate_limit_remaining, retry_after_secs};
use crate::store::{RateLimitState, RateLimitStore};

/// Thresholds and caps for preventive delays and 429 cooldowns.
///
/// The defaults are hand-tuned values carried over from production use; tune
/// them per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Above this many remaining requests no delay is applied at all.
    pub preventive_threshold: u32,
    pub critical_threshold: u32,
    pub low_threshold: u32,
    pub medium_threshold: u32,
    /// Cap for the critical band and for the post-429 cooldown.
    pub max_wait: Duration,
    pub max_low_wait: Duration,
    pub max_medium_wait: Duration,
    /// Assumed reset window when the server sends no usable `Retry-After`.
    pub default_wait: Duration,
    /// Extra store TTL beyond the reset window.
    pub ttl_buffer: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            preventive_threshold: 2,
            critical_threshold: 0,
            low_threshold: 2,
            medium_threshold: 5,
            max_wait: Duration::from_secs(90),
            max_low_wait: Duration::from_secs(30),
            max_medium_wait: Duration::from_secs(10),
            default_wait: Duration::from_secs(90),
            ttl_buffer: Duration::from_secs(10),
        }
    }
}

impl RateLimitPolicy {
    /// Delay to apply before sending, given the remaining quota and the time
    /// left until it resets.
    pub fn preventive_delay(&self, remaining: u32, wait: Duration) -> Duration {
        if remaining > self.preventive_threshold || wait.is_zero() {
            return Duration::ZERO;
        }
        if remaining <= self.critical_threshold {
            wait.min(self.max_wait)
        } else if remaining <= self.low_threshold {
            (wait / 2).min(self.max_low_wait)
        } else if remaining <= self.medium_threshold {
            (wait / 4).min(self.max_medium_wait)
        } else {
            Duration::ZERO
        }
    }

    fn wait_from(&self, headers: &HeaderMap) -> Duration {
        match retry_after_secs(headers) {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => self.default_wait,
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub struct RateLimitTracker {
    store: Option<Arc<dyn RateLimitStore>>,
    key: String,
    policy: RateLimitPolicy,
}

impl RateLimitTracker {
    pub fn new(
        store: Option<Arc<dyn RateLimitStore>>,
        key: impl Into<String>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            policy,
        }
    }

    /// Apply the preventive delay for the currently stored quota, if any.
    /// Returns the delay that was applied.
    pub async fn check_before_request(&self, cancel: &CancellationToken) -> Result<Duration> {
        let Some(state) = self.load().await else {
            return Ok(Duration::ZERO);
        };
        if state.remaining > self.policy.preventive_threshold {
            return Ok(Duration::ZERO);
        }

        let wait = match (state.reset_time - Utc::now()).to_std() {
            Ok(w) if !w.is_zero() => w,
            _ => {
                debug!("Rate limit state past its reset time; clearing");
                self.clear().await;
                return Ok(Duration::ZERO);
            }
        };

        let delay = self.policy.preventive_delay(state.remaining, wait);
        if !delay.is_zero() {
            info!(
                "Rate limit preventive delay: {:.1} seconds (remaining: {})",
                delay.as_secs_f64(),
                state.remaining
            );
            pause(delay, cancel).await?;
        }
        Ok(delay)
    }

    /// Record the quota advertised by a successful response. Responses
    /// without `X-RateLimit-Remaining` leave the stored state untouched.
    pub async fn record_success(&self, headers: &HeaderMap) {
        let Some(remaining) = rate_limit_remaining(headers) else {
            return;
        };
        let wait = self.policy.wait_from(headers);
        let state = RateLimitState::new(remaining, reset_after(wait));
        self.save(&state, wait.saturating_add(self.policy.ttl_buffer)).await;
        debug!(
            "Rate limit updated: remaining={} reset_time={}",
            state.remaining,
            state.reset_time.to_rfc3339()
        );
    }

    /// Record a 429 and hold the caller for the cooldown. Returns the
    /// cooldown that was applied.
    pub async fn record_rate_limited(
        &self,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        let wait = self.policy.wait_from(headers);
        let state = RateLimitState::new(0, reset_after(wait));
        self.save(&state, wait.saturating_add(self.policy.ttl_buffer)).await;

        let cooldown = wait.min(self.policy.max_wait);
        info!(
            "Rate limit hit, waiting {} seconds before retry",
            cooldown.as_secs()
        );
        pause(cooldown, cancel).await?;
        Ok(cooldown)
    }

    async fn load(&self) -> Option<RateLimitState> {
        let store = self.store.as_ref()?;
        match store.get(&self.key).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Rate limit store read failed; continuing uncoordinated: {}", e);
                None
            }
        }
    }

    async fn save(&self, state: &RateLimitState, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.set(&self.key, state, ttl).await {
            warn!("Rate limit store write failed: {}", e);
        }
    }

    async fn clear(&self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.delete(&self.key).await {
            warn!("Rate limit store delete failed: {}", e);
        }
    }
}

fn reset_after(wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|w| Utc::now().checked_add_signed(w))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
