//! Shared types used across FlowGrid crates.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One backend instance eligible for traffic.
///
/// The identity scheme (pod name, instance label, node name) is chosen by
/// configuration; once a sample has been resolved to a `Target` every
/// downstream stage compares targets by this string only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for Target {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The metric a query feeds into a [`MetricSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// GPU compute utilization, percent.
    Utilization,
    /// GPU memory utilization, percent.
    Memory,
    /// Power draw, watts.
    Power,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Utilization,
        MetricKind::Memory,
        MetricKind::Power,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Utilization => "utilization",
            MetricKind::Memory => "memory",
            MetricKind::Power => "power",
        }
    }
}

/// Resource usage of one target at query time.
///
/// Every field is a non-negative real. A metric with no sample for the
/// target stays at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub utilization: f64,
    pub memory: f64,
    pub power: f64,
}

impl MetricSample {
    pub fn new(utilization: f64, memory: f64, power: f64) -> Self {
        Self {
            utilization: non_negative(utilization),
            memory: non_negative(memory),
            power: non_negative(power),
        }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Utilization => self.utilization,
            MetricKind::Memory => self.memory,
            MetricKind::Power => self.power,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: f64) {
        let value = non_negative(value);
        match kind {
            MetricKind::Utilization => self.utilization = value,
            MetricKind::Memory => self.memory = value,
            MetricKind::Power => self.power = value,
        }
    }
}

/// Clamp negative, NaN and infinite values to zero.
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Coefficients of the score function
/// `performance*rating - utilization*util - memory*mem - power*watts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub performance: f64,
    pub utilization: f64,
    pub memory: f64,
    pub power: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            performance: 100.0,
            utilization: 0.3,
            memory: 0.2,
            power: 0.1,
        }
    }
}

impl ScoreWeights {
    pub(crate) fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("performance", self.performance),
            ("utilization", self.utilization),
            ("memory", self.memory),
            ("power", self.power),
        ]
    }
}

/// Static performance ratings, resolved per target.
///
/// Resolution order: explicit per-target entry, then the hardware model
/// reported by the metrics backend, then `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingTable {
    pub default: f64,
    pub models: BTreeMap<String, f64>,
    pub targets: BTreeMap<String, f64>,
}

impl Default for RatingTable {
    fn default() -> Self {
        let models = BTreeMap::from([
            ("NVIDIA GeForce RTX 3070".to_string(), 1.0),
            ("NVIDIA GeForce RTX 4070".to_string(), 1.4),
        ]);
        Self {
            default: 1.0,
            models,
            targets: BTreeMap::new(),
        }
    }
}

impl RatingTable {
    pub fn rating(&self, target: &Target, model: Option<&str>) -> f64 {
        if let Some(rating) = self.targets.get(target.as_str()) {
            return *rating;
        }
        model
            .and_then(|m| self.models.get(m))
            .copied()
            .unwrap_or(self.default)
    }
}

/// The routing resource whose route list receives the weights.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteResource {
    /// Resource kind as understood by the control plane, e.g. `virtualservice`.
    pub kind: String,
    pub name: String,
    pub namespace: String,
    /// Index of the `http` route group the weights apply to.
    pub group: usize,
}

impl RouteResource {
    /// Identity used for mutual exclusion: `{namespace}/{kind}/{name}`.
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

impl fmt::Display for RouteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}
