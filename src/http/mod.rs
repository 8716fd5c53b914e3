use crate::config::Config;
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub const API_KEY_HEADER: &str = "Api-Key";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-RateLimit-Remaining";

/// One physical request. The same value is re-sent on every attempt of a
/// logical call, so `request_id` stays stable across retries.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub request_id: String,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Failure below HTTP: nothing usable came back from the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    Header(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Url and header errors come from the request itself and fail the same
    /// way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Url(_) | TransportError::Header(_))
    }
}

/// Sends a single request; retry policy lives above this.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub fn build_client(cfg: &Config) -> Result<Client, TransportError> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(&cfg.user_agent)
        .map_err(|e| TransportError::Header(format!("user agent: {e}")))?;
    default_headers.insert(USER_AGENT, ua);
    // Api-Key is injected per request so executors can share one reqwest client.
    let builder = Client::builder()
        .default_headers(default_headers)
        .timeout(cfg.timeout())
        .use_rustls_tls();
    Ok(builder.build()?)
}

/// `RequestExecutor` over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
    base_url: Url,
    api_key: HeaderValue,
}

impl ReqwestExecutor {
    pub fn new(cfg: &Config) -> Result<Self, TransportError> {
        let client = build_client(cfg)?;
        Self::with_client(client, cfg)
    }

    pub fn with_client(client: Client, cfg: &Config) -> Result<Self, TransportError> {
        // Url::join drops the last segment unless the base ends with '/'.
        let mut base = cfg.api_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut api_key = HeaderValue::from_str(cfg.api_key.trim())
            .map_err(|e| TransportError::Header(format!("api key: {e}")))?;
        api_key.set_sensitive(true);
        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            api_key,
        })
    }

    pub fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        debug!("{} {} (request {})", request.method, url, request.request_id);

        let request_id = HeaderValue::from_str(&request.request_id)
            .map_err(|e| TransportError::Header(format!("request id: {e}")))?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(API_KEY_HEADER, self.api_key.clone())
            .header(REQUEST_ID_HEADER, request_id)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let res = builder.send().await?;
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.bytes().await?.to_vec();
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

// HeaderMap normalizes names, so both lookups below are case-insensitive.

pub fn rate_limit_remaining(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(RATE_LIMIT_REMAINING_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
}

pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}
