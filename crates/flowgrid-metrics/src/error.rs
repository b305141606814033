//! Metrics intake error types.

use std::time::Duration;

use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Failures fetching or decoding samples. All of them abort the pass.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("cannot reach metrics backend at {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("invalid metrics request: {0}")]
    Request(String),

    #[error("metrics backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("metrics query timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed metrics response: {0}")]
    Decode(String),

    #[error("query `{query}` rejected: {reason}")]
    Query { query: String, reason: String },
}
