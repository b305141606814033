//! JSON Patch wire types.

use serde::{Deserialize, Serialize};

use flow_core::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchVerb {
    Replace,
}

/// One positional weight assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchVerb,
    pub path: String,
    pub value: u32,
}

impl PatchOp {
    /// `replace /spec/http/{group}/route/{index}/weight`.
    pub fn replace_weight(group: usize, index: usize, weight: u32) -> Self {
        Self {
            op: PatchVerb::Replace,
            path: format!("/spec/http/{group}/route/{index}/weight"),
            value: weight,
        }
    }
}

/// The ordered operation list applied in one sink call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDocument(pub Vec<PatchOp>);

impl PatchDocument {
    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One destination in the live route list, at its list position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: Target,
    /// Current weight; absent when the resource leaves it implicit.
    pub weight: Option<u32>,
}

impl RouteEntry {
    pub fn new(destination: impl Into<Target>, weight: Option<u32>) -> Self {
        Self {
            destination: destination.into(),
            weight,
        }
    }
}
