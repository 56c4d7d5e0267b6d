use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },
    #[error("Request timed out")]
    Timeout,
}

impl warp::reject::Reject for GatewayError {}
