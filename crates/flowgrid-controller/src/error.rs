//! Controller error types.

use thiserror::Error;

/// Hard failures of a pass. Each one leaves the routing resource as it was.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("metrics fetch failed: {0}")]
    MetricsFetch(#[from] flowgrid_metrics::MetricsError),

    #[error("routing sink failed: {0}")]
    Sink(#[from] flowgrid_sink::SinkError),

    #[error("route order mismatch: {0}")]
    RouteOrderMismatch(String),

    #[error("another pass holds {resource} ({detail})")]
    Busy { resource: String, detail: String },

    #[error("lock file error: {0}")]
    Lock(#[from] std::io::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
