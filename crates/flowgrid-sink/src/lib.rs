//! flowgrid-sink — applying weights to a live routing resource.
//!
//! The controller produces one [`PatchDocument`] per pass: a list of
//! positional `replace` operations against `spec.http[N].route[i].weight`.
//! A [`RoutingSink`] reads the current route list (so positions can be
//! checked) and applies the document in a single call.
//!
//! # Architecture
//!
//! ```text
//! RoutingSink (trait)
//!   ├── KubectlSink   → kubectl get -o json / kubectl patch --type=json
//!   └── RecordingSink → in-memory route list, keeps applied documents
//! ```
//!
//! Every external command is bounded by a timeout and killed on expiry.

pub mod error;
pub mod kubectl;
pub mod patch;
pub mod sink;

pub use error::{SinkError, SinkResult};
pub use kubectl::KubectlSink;
pub use patch::{PatchDocument, PatchOp, PatchVerb, RouteEntry};
pub use sink::{RecordingSink, RoutingSink};
