//! Weights → positional JSON Patch.

use flow_core::Target;
use flowgrid_sink::{PatchDocument, PatchOp};

use crate::error::{ControllerError, ControllerResult};

/// Builds `replace /spec/http/{group}/route/{index}/weight` operations.
///
/// The index is the position of the entry in the input slice. The
/// builder never looks targets up by name in the routing resource, so the
/// input must already be in live route-list order; use
/// [`build_for_routes`](PatchBuilder::build_for_routes) to have that
/// checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchBuilder {
    group: usize,
}

impl PatchBuilder {
    pub fn new(group: usize) -> Self {
        Self { group }
    }

    pub fn build(&self, weights: &[(Target, u32)]) -> PatchDocument {
        PatchDocument(
            weights
                .iter()
                .enumerate()
                .map(|(index, (_, weight))| PatchOp::replace_weight(self.group, index, *weight))
                .collect(),
        )
    }

    /// Build after checking that `weights` lists exactly `routes`, in order.
    pub fn build_for_routes(
        &self,
        weights: &[(Target, u32)],
        routes: &[Target],
    ) -> ControllerResult<PatchDocument> {
        if weights.len() != routes.len() {
            return Err(ControllerError::RouteOrderMismatch(format!(
                "{} weights for {} routes",
                weights.len(),
                routes.len()
            )));
        }
        for (index, ((target, _), route)) in weights.iter().zip(routes).enumerate() {
            if target != route {
                return Err(ControllerError::RouteOrderMismatch(format!(
                    "position {index} is {route} in the route list but {target} in the weights"
                )));
            }
        }
        Ok(self.build(weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(pairs: &[(&str, u32)]) -> Vec<(Target, u32)> {
        pairs.iter().map(|(t, w)| (Target::from(*t), *w)).collect()
    }

    fn routes(names: &[&str]) -> Vec<Target> {
        names.iter().map(|n| Target::from(*n)).collect()
    }

    #[test]
    fn indices_follow_input_order() {
        let doc = PatchBuilder::default().build(&w(&[("a", 40), ("b", 60)]));
        assert_eq!(
            doc.ops(),
            &[
                PatchOp::replace_weight(0, 0, 40),
                PatchOp::replace_weight(0, 1, 60),
            ]
        );
        assert_eq!(doc.ops()[1].path, "/spec/http/0/route/1/weight");
    }

    #[test]
    fn group_is_configurable() {
        let doc = PatchBuilder::new(3).build(&w(&[("a", 100)]));
        assert_eq!(doc.ops()[0].path, "/spec/http/3/route/0/weight");
    }

    #[test]
    fn matching_route_order_is_accepted() {
        let doc = PatchBuilder::default()
            .build_for_routes(&w(&[("a", 40), ("b", 60)]), &routes(&["a", "b"]))
            .unwrap();
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn swapped_order_is_rejected() {
        let err = PatchBuilder::default()
            .build_for_routes(&w(&[("a", 40), ("b", 60)]), &routes(&["b", "a"]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::RouteOrderMismatch(msg) if msg.contains("position 0")));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = PatchBuilder::default()
            .build_for_routes(&w(&[("a", 100)]), &routes(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::RouteOrderMismatch(_)));
    }
}
