use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::{retry_after_secs, ApiRequest, ApiResponse, RequestExecutor, TransportError};
use crate::rate_limit::{pause, RateLimitTracker};

/// Exponential backoff for 5xx (and higher) responses and transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Delay after the given 1-based attempt: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// What a single physical attempt came back with.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(ApiResponse),
    /// 4xx other than 429, plus anything else that is neither success nor
    /// retryable. Never retried.
    ClientError(StatusCode, String),
    RateLimited {
        retry_after: Option<u64>,
        headers: HeaderMap,
    },
    ServerError(StatusCode),
    TransportFailure(TransportError),
}

pub fn classify(result: std::result::Result<ApiResponse, TransportError>) -> AttemptOutcome {
    let response = match result {
        Ok(r) => r,
        Err(e) => return AttemptOutcome::TransportFailure(e),
    };
    let status = response.status;
    if status.is_success() {
        AttemptOutcome::Success(response)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        AttemptOutcome::RateLimited {
            retry_after: retry_after_secs(&response.headers),
            headers: response.headers,
        }
    } else if status.as_u16() >= 500 {
        AttemptOutcome::ServerError(status)
    } else {
        AttemptOutcome::ClientError(status, response.text())
    }
}

/// Runs one logical call as a bounded sequence of attempts.
pub struct RetryCoordinator {
    executor: Arc<dyn RequestExecutor>,
    tracker: RateLimitTracker,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryCoordinator {
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        tracker: RateLimitTracker,
        max_attempts: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            executor,
            tracker,
            max_attempts,
            backoff,
        }
    }

    /// `Ok(Some(_))` on success, `Ok(None)` when the API rejected the request.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<ApiResponse>> {
        let mut attempt: u32 = 0;
        while attempt < self.max_attempts {
            attempt += 1;
            self.tracker.check_before_request(cancel).await?;

            debug!(
                "{} {} attempt {}/{} (request {})",
                request.method, request.path, attempt, self.max_attempts, request.request_id
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.executor.execute(request) => r,
            };
            let attempts_left = attempt < self.max_attempts;

            match classify(result) {
                AttemptOutcome::Success(response) => {
                    self.tracker.record_success(&response.headers).await;
                    return Ok(Some(response));
                }
                AttemptOutcome::ClientError(status, body) => {
                    warn!(
                        "Client error encountered: {} {} status {} response {}",
                        request.method, request.path, status, body
                    );
                    return Ok(None);
                }
                AttemptOutcome::RateLimited { headers, .. } => {
                    self.tracker.record_rate_limited(&headers, cancel).await?;
                    if !attempts_left {
                        return Err(Error::RateLimitExceeded { attempts: attempt });
                    }
                }
                AttemptOutcome::ServerError(status) => {
                    if !attempts_left {
                        return Err(Error::ServerErrorExhausted {
                            status,
                            attempts: attempt,
                        });
                    }
                    let backoff = self.backoff.delay_for(attempt);
                    warn!(
                        "{} {} retrying (status {}), backoff {:?}",
                        request.method, request.path, status, backoff
                    );
                    pause(backoff, cancel).await?;
                }
                AttemptOutcome::TransportFailure(e) => {
                    if !attempts_left || !e.is_retryable() {
                        return Err(e.into());
                    }
                    let backoff = self.backoff.delay_for(attempt);
                    warn!(
                        "{} {} error sending request: {}; backoff {:?}",
                        request.method, request.path, e, backoff
                    );
                    pause(backoff, cancel).await?;
                }
            }
        }
        Err(Error::Internal(format!(
            "retry loop ended without an outcome after {attempt} attempt(s)"
        )))
    }
}
