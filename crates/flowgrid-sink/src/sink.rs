//! The routing sink seam.

use std::future::Future;
use std::sync::Mutex;

use flow_core::RouteResource;

use crate::error::{SinkError, SinkResult};
use crate::patch::{PatchDocument, RouteEntry};

/// A control plane holding the routing resource.
pub trait RoutingSink {
    /// The destinations of route group `resource.group`, in list order.
    fn current_routes(
        &self,
        resource: &RouteResource,
    ) -> impl Future<Output = SinkResult<Vec<RouteEntry>>> + Send;

    /// Apply the whole document, or nothing.
    fn apply(
        &self,
        resource: &RouteResource,
        patch: &PatchDocument,
    ) -> impl Future<Output = SinkResult<()>> + Send;
}

/// In-memory sink: a single route list that patches are applied to.
///
/// Documents are validated in full before any weight changes, so a
/// rejected document leaves the routes untouched.
#[derive(Debug, Default)]
pub struct RecordingSink {
    routes: Mutex<Vec<RouteEntry>>,
    applied: Mutex<Vec<PatchDocument>>,
    reject: Option<String>,
}

impl RecordingSink {
    pub fn new(routes: Vec<RouteEntry>) -> Self {
        Self {
            routes: Mutex::new(routes),
            ..Default::default()
        }
    }

    /// A sink whose every `apply` fails with `stderr`.
    pub fn rejecting(routes: Vec<RouteEntry>, stderr: &str) -> Self {
        Self {
            routes: Mutex::new(routes),
            applied: Mutex::default(),
            reject: Some(stderr.to_string()),
        }
    }

    pub fn routes(&self) -> Vec<RouteEntry> {
        self.routes.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Documents successfully applied, oldest first.
    pub fn applied(&self) -> Vec<PatchDocument> {
        self.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn rejected(resource: &RouteResource, stderr: String) -> SinkError {
        SinkError::Rejected {
            resource: resource.id(),
            code: 1,
            stderr,
        }
    }
}

/// Parse `/spec/http/{group}/route/{index}/weight`.
fn weight_path(path: &str) -> Option<(usize, usize)> {
    let rest = path.strip_prefix("/spec/http/")?;
    let (group, rest) = rest.split_once("/route/")?;
    let index = rest.strip_suffix("/weight")?;
    Some((group.parse().ok()?, index.parse().ok()?))
}

impl RoutingSink for RecordingSink {
    async fn current_routes(&self, _resource: &RouteResource) -> SinkResult<Vec<RouteEntry>> {
        Ok(self.routes())
    }

    async fn apply(&self, resource: &RouteResource, patch: &PatchDocument) -> SinkResult<()> {
        if let Some(stderr) = &self.reject {
            return Err(Self::rejected(resource, stderr.clone()));
        }

        let mut routes = self
            .routes
            .lock()
            .map_err(|_| Self::rejected(resource, "route list poisoned".to_string()))?;

        let mut updates = Vec::with_capacity(patch.len());
        for op in patch.ops() {
            match weight_path(&op.path) {
                Some((group, index)) if group == resource.group && index < routes.len() => {
                    updates.push((index, op.value));
                }
                _ => {
                    return Err(Self::rejected(
                        resource,
                        format!("path {} does not exist", op.path),
                    ));
                }
            }
        }
        for (index, weight) in updates {
            routes[index].weight = Some(weight);
        }
        drop(routes);

        if let Ok(mut applied) = self.applied.lock() {
            applied.push(patch.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOp;

    fn resource() -> RouteResource {
        RouteResource {
            kind: "virtualservice".to_string(),
            name: "api".to_string(),
            namespace: "default".to_string(),
            group: 0,
        }
    }

    fn routes() -> Vec<RouteEntry> {
        vec![RouteEntry::new("a", Some(50)), RouteEntry::new("b", Some(50))]
    }

    #[test]
    fn weight_path_parses() {
        assert_eq!(weight_path("/spec/http/0/route/3/weight"), Some((0, 3)));
        assert_eq!(weight_path("/spec/http/0/route/x/weight"), None);
        assert_eq!(weight_path("/spec/tcp/0/route/1/weight"), None);
    }

    #[tokio::test]
    async fn apply_updates_weights_in_place() {
        let sink = RecordingSink::new(routes());
        let doc = PatchDocument(vec![
            PatchOp::replace_weight(0, 0, 30),
            PatchOp::replace_weight(0, 1, 70),
        ]);

        sink.apply(&resource(), &doc).await.unwrap();

        let r = sink.current_routes(&resource()).await.unwrap();
        assert_eq!(r[0].weight, Some(30));
        assert_eq!(r[1].weight, Some(70));
        assert_eq!(sink.applied(), vec![doc]);
    }

    #[tokio::test]
    async fn out_of_range_document_changes_nothing() {
        let sink = RecordingSink::new(routes());
        let doc = PatchDocument(vec![
            PatchOp::replace_weight(0, 0, 10),
            PatchOp::replace_weight(0, 2, 90),
        ]);

        let err = sink.apply(&resource(), &doc).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected { .. }));
        assert_eq!(sink.routes(), routes());
        assert!(sink.applied().is_empty());
    }

    #[tokio::test]
    async fn rejecting_sink_surfaces_stderr() {
        let sink = RecordingSink::rejecting(routes(), "admission webhook denied");
        let doc = PatchDocument(vec![PatchOp::replace_weight(0, 0, 100)]);

        match sink.apply(&resource(), &doc).await.unwrap_err() {
            SinkError::Rejected { stderr, resource, .. } => {
                assert_eq!(stderr, "admission webhook denied");
                assert_eq!(resource, "default/virtualservice/api");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
