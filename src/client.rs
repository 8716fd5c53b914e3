use log::debug;
use reqwest::Method;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::http::{ApiRequest, ApiResponse, RequestExecutor, ReqwestExecutor};
use crate::rate_limit::RateLimitTracker;
use crate::retry::RetryCoordinator;
use crate::store::RateLimitStore;

/// Vectorify HTTP client with rate limiting and retries.
///
/// Cheap to clone; clones share the connection pool and the rate-limit store.
/// Every call returns `Ok(None)` when the API rejects the request (4xx other
/// than 429).
#[derive(Clone)]
pub struct Client {
    inner: Arc<RetryCoordinator>,
}

impl Client {
    /// Build a client over `reqwest`. `store` enables cross-process
    /// coordination; `None` disables rate-limit tracking entirely.
    pub fn new(mut config: Config, store: Option<Arc<dyn RateLimitStore>>) -> Result<Self> {
        config.validate()?;
        let executor = ReqwestExecutor::new(&config)?;
        Ok(Self::assemble(&config, store, Arc::new(executor)))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_executor(
        mut config: Config,
        store: Option<Arc<dyn RateLimitStore>>,
        executor: Arc<dyn RequestExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(&config, store, executor))
    }

    fn assemble(
        config: &Config,
        store: Option<Arc<dyn RateLimitStore>>,
        executor: Arc<dyn RequestExecutor>,
    ) -> Self {
        debug!(
            "vectorify client: base={} attempts={} key={} shared_store={}",
            config.api_url,
            config.max_attempts,
            config.rate_limit_key,
            store.is_some()
        );
        let tracker = RateLimitTracker::new(store, config.rate_limit_key.clone(), config.rate_limit);
        let coordinator =
            RetryCoordinator::new(executor, tracker, config.max_attempts, config.backoff);
        Self {
            inner: Arc::new(coordinator),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Option<ApiResponse>> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Vec<u8>>) -> Result<Option<ApiResponse>> {
        self.request(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Option<Vec<u8>>) -> Result<Option<ApiResponse>> {
        self.request(Method::PUT, path, body).await
    }

    pub async fn patch(&self, path: &str, body: Option<Vec<u8>>) -> Result<Option<ApiResponse>> {
        self.request(Method::PATCH, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Option<ApiResponse>> {
        self.request(Method::DELETE, path, None).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Option<ApiResponse>> {
        self.request_with_cancel(method, path, body, &CancellationToken::new())
            .await
    }

    /// Like [`Client::request`], aborting with `Error::Cancelled` as soon as
    /// `cancel` fires, including mid-backoff or mid-cooldown.
    pub async fn request_with_cancel(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<Option<ApiResponse>> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.inner.execute(&request, cancel).await
    }
}
