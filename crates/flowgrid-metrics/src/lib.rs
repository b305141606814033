//! flowgrid-metrics — metric intake for the weight controller.
//!
//! Issues the three per-pass instant queries (utilization, memory, power)
//! against a metrics backend, maps every returned series to a [`Target`]
//! exactly once, and hands the controller a [`SampleSet`] in which absent
//! metrics read as zero.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   ├── PrometheusSource → GET /api/v1/query over HTTP/1.1
//!   └── StaticSource     → canned series, for tests and dry runs
//!
//! fetch_snapshot() → RawSnapshot (one Vec<RawSample> per MetricKind)
//!   └── TargetResolver::resolve() → SampleSet (Target → MetricSample)
//! ```
//!
//! [`Target`]: flow_core::Target

pub mod error;
pub mod prometheus;
pub mod resolver;
pub mod source;
pub mod store;

pub use error::{MetricsError, MetricsResult};
pub use prometheus::PrometheusSource;
pub use resolver::TargetResolver;
pub use source::{MetricQueries, MetricsSource, RawSample, RawSnapshot, StaticSource, fetch_snapshot};
pub use store::SampleSet;
