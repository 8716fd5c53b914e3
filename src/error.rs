use reqwest::StatusCode;
use thiserror::Error;

use crate::http::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client.
///
/// Rejected requests (4xx other than 429) are not errors: they come back as
/// `Ok(None)` from the request methods.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("rate limit exceeded after {attempts} attempt(s)")]
    RateLimitExceeded { attempts: u32 },

    #[error("server error {status} persisted after {attempts} attempt(s)")]
    ServerErrorExhausted { status: StatusCode, attempts: u32 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("request cancelled")]
    Cancelled,

    #[error("payload encoding failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the errors produced by running out of attempts.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Error::RateLimitExceeded { .. } | Error::ServerErrorExhausted { .. }
        )
    }
}
