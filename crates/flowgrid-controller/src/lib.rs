//! flowgrid-controller — metric-driven traffic weights.
//!
//! One pass turns fresh utilization samples into a JSON Patch against
//! the route list of a routing resource.
//!
//! # Pass
//!
//! ```text
//! fetch_snapshot()            three instant queries, bounded timeout
//!   → TargetResolver          label → Target, absent metrics = 0
//!   → ScoreEngine             max(0, Wp*rating - Wu*util - Wm*mem - Ww*power)
//!   → normalize()             floor(score / total * 100), largest remainder
//!                             residual, equal split when total == 0
//!   → PatchBuilder            replace /spec/http/{g}/route/{i}/weight,
//!                             positions checked against the live route list
//!   → RoutingSink::apply()    one document, all or nothing
//! ```
//!
//! Passes against the same resource never overlap: an in-process mutex
//! per resource plus a lock file for separate processes.

pub mod controller;
pub mod error;
pub mod lock;
pub mod normalize;
pub mod patch;
pub mod score;

pub use controller::{Controller, PassOutcome, PassReport};
pub use error::{ControllerError, ControllerResult};
pub use lock::{PassLock, RouteLocks};
pub use normalize::{Normalized, normalize};
pub use patch::PatchBuilder;
pub use score::{ScoreBreakdown, ScoreEngine};
