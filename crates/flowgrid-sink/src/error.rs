//! Routing sink error types.

use std::time::Duration;

use thiserror::Error;

pub type SinkResult<T> = Result<T, SinkError>;

/// Failures reading or patching the routing resource. None are retried
/// within a pass.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{resource} rejected by control plane (exit code {code}): {stderr}")]
    Rejected {
        resource: String,
        code: i32,
        stderr: String,
    },

    #[error("cannot read routes of {resource}: {reason}")]
    Routes { resource: String, reason: String },

    #[error("failed to encode patch: {0}")]
    Encode(#[from] serde_json::Error),
}
