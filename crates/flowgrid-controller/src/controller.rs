//! Controller — one pass from samples to an applied patch.
//!
//! A pass fetches samples, reads the live route list, scores and
//! normalizes over that list, and applies the resulting document. Any
//! hard error before `apply` returns early, so the routing resource is
//! either fully updated or untouched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use flow_core::{ConfigError, FlowConfig, RouteResource, Target};
use flowgrid_metrics::{MetricQueries, MetricsSource, TargetResolver, fetch_snapshot};
use flowgrid_sink::{PatchDocument, RouteEntry, RoutingSink};

use crate::error::{ControllerError, ControllerResult};
use crate::lock::{PassLock, RouteLocks};
use crate::normalize::{Normalized, normalize};
use crate::patch::PatchBuilder;
use crate::score::{ScoreBreakdown, ScoreEngine};

/// What a pass did with its patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// The document was applied.
    Applied,
    /// Live weights already matched; nothing was sent.
    Unchanged,
    /// Computed only (`plan`).
    Planned,
    /// The route group has no destinations.
    NoRoutes,
}

/// Everything a pass computed.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub resource: String,
    /// Live route order the weights were computed over.
    pub routes: Vec<Target>,
    /// Scores of every observed target.
    pub scores: Vec<ScoreBreakdown>,
    pub weights: Normalized,
    pub patch: PatchDocument,
    pub outcome: PassOutcome,
    /// Route destinations with no series at all; they score 0.
    pub unobserved: Vec<Target>,
    /// Observed targets absent from the route list; they get no traffic.
    pub unrouted: Vec<Target>,
}

pub struct Controller<M, S> {
    source: M,
    sink: S,
    resource: RouteResource,
    queries: MetricQueries,
    resolver: TargetResolver,
    engine: ScoreEngine,
    expected_order: Option<Vec<Target>>,
    metrics_timeout: Duration,
    locks: RouteLocks,
    lock_dir: Option<PathBuf>,
    stale_lock: Duration,
}

impl<M: MetricsSource, S: RoutingSink> Controller<M, S> {
    /// A controller with default queries, labels and score weights and no
    /// lock file.
    pub fn new(source: M, sink: S, resource: RouteResource) -> Self {
        Self {
            source,
            sink,
            resource,
            queries: MetricQueries::default(),
            resolver: TargetResolver::new("pod", None, "modelName"),
            engine: ScoreEngine::default(),
            expected_order: None,
            metrics_timeout: Duration::from_secs(10),
            locks: RouteLocks::new(),
            lock_dir: None,
            stale_lock: Duration::from_secs(600),
        }
    }

    pub fn from_config(config: &FlowConfig, source: M, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            sink,
            resource: config.route_resource(),
            queries: MetricQueries::from_config(&config.metrics),
            resolver: TargetResolver::from_config(&config.metrics),
            engine: ScoreEngine::new(config.score, config.ratings.clone()),
            expected_order: config.static_targets(),
            metrics_timeout: config.metrics_timeout()?,
            locks: RouteLocks::new(),
            lock_dir: Some(config.lock_dir()),
            stale_lock: config.stale_lock()?,
        })
    }

    pub fn with_resolver(mut self, resolver: TargetResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_engine(mut self, engine: ScoreEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_queries(mut self, queries: MetricQueries) -> Self {
        self.queries = queries;
        self
    }

    /// Require the live route list to be exactly `order`.
    pub fn with_expected_order(mut self, order: Vec<Target>) -> Self {
        self.expected_order = Some(order);
        self
    }

    pub fn with_metrics_timeout(mut self, timeout: Duration) -> Self {
        self.metrics_timeout = timeout;
        self
    }

    /// Share in-process locks with other controllers.
    pub fn with_locks(mut self, locks: RouteLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Also take a lock file in `dir` for the duration of each pass.
    pub fn with_lock_dir(mut self, dir: PathBuf, stale_after: Duration) -> Self {
        self.lock_dir = Some(dir);
        self.stale_lock = stale_after;
        self
    }

    pub fn resource(&self) -> &RouteResource {
        &self.resource
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Compute a pass without applying it.
    pub async fn plan(&self) -> ControllerResult<PassReport> {
        self.compute().await
    }

    /// Run one serialized pass and apply the result.
    pub async fn run_once(&self) -> ControllerResult<PassReport> {
        let _guard = self.locks.lock(&self.resource).await;
        let _file = match &self.lock_dir {
            Some(dir) => Some(PassLock::acquire(dir, &self.resource, self.stale_lock)?),
            None => None,
        };

        let mut report = self.compute().await?;
        if report.outcome != PassOutcome::Planned {
            return Ok(report);
        }

        self.sink.apply(&self.resource, &report.patch).await?;
        report.outcome = PassOutcome::Applied;
        info!(
            resource = %self.resource,
            weights = %format_weights(&report.weights),
            degenerate = report.weights.degenerate,
            "weights applied"
        );
        Ok(report)
    }

    /// Run passes every `interval` until `shutdown` fires.
    ///
    /// The first pass starts immediately. Failed passes are logged and
    /// retried on the next tick.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            resource = %self.resource,
            interval_secs = interval.as_secs(),
            "controller started"
        );

        loop {
            match self.run_once().await {
                Ok(report) => debug!(outcome = ?report.outcome, "pass finished"),
                Err(e) => error!(resource = %self.resource, error = %e, "pass failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    async fn compute(&self) -> ControllerResult<PassReport> {
        let snapshot = fetch_snapshot(
            &self.source,
            &self.queries,
            Some(SystemTime::now()),
            self.metrics_timeout,
        )
        .await?;
        let samples = self.resolver.resolve(&snapshot);

        let live = self.sink.current_routes(&self.resource).await?;
        let routes = self.route_order(&live)?;

        let scores = self.engine.score_all(&samples);
        let by_target: HashMap<Target, f64> = scores
            .iter()
            .map(|b| (b.target.clone(), b.score))
            .collect();

        let unobserved: Vec<Target> = routes
            .iter()
            .filter(|t| !samples.contains(t))
            .cloned()
            .collect();
        if !unobserved.is_empty() {
            warn!(
                resource = %self.resource,
                targets = ?unobserved.iter().map(Target::as_str).collect::<Vec<_>>(),
                "route destinations without samples score 0"
            );
        }
        let unrouted: Vec<Target> = samples
            .targets()
            .filter(|t| !routes.contains(t))
            .cloned()
            .collect();
        if !unrouted.is_empty() {
            warn!(
                resource = %self.resource,
                targets = ?unrouted.iter().map(Target::as_str).collect::<Vec<_>>(),
                "observed targets missing from the route list are ignored"
            );
        }

        let resource = self.resource.id();
        if routes.is_empty() {
            warn!(%resource, "route group is empty, nothing to patch");
            return Ok(PassReport {
                resource,
                routes,
                scores,
                weights: Normalized::default(),
                patch: PatchDocument::default(),
                outcome: PassOutcome::NoRoutes,
                unobserved,
                unrouted,
            });
        }

        let weights = normalize(&by_target, &routes);
        let patch = PatchBuilder::new(self.resource.group).build_for_routes(&weights.weights, &routes)?;

        let unchanged = live
            .iter()
            .zip(&weights.weights)
            .all(|(entry, (_, w))| entry.weight == Some(*w));
        let outcome = if unchanged {
            debug!(%resource, "live weights already match");
            PassOutcome::Unchanged
        } else {
            PassOutcome::Planned
        };

        Ok(PassReport {
            resource,
            routes,
            scores,
            weights,
            patch,
            outcome,
            unobserved,
            unrouted,
        })
    }

    /// The live route order, checked against the configured order if any.
    fn route_order(&self, live: &[RouteEntry]) -> ControllerResult<Vec<Target>> {
        let order: Vec<Target> = live.iter().map(|e| e.destination.clone()).collect();

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = order.iter().find(|t| !seen.insert(*t)) {
            return Err(ControllerError::RouteOrderMismatch(format!(
                "{dup} appears more than once in the route list"
            )));
        }

        if let Some(expected) = &self.expected_order
            && expected != &order
        {
            return Err(ControllerError::RouteOrderMismatch(format!(
                "configured order [{}] differs from live order [{}]",
                join(expected),
                join(&order)
            )));
        }
        Ok(order)
    }
}

fn join(targets: &[Target]) -> String {
    targets
        .iter()
        .map(Target::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_weights(weights: &Normalized) -> String {
    weights
        .weights
        .iter()
        .map(|(t, w)| format!("{t}={w}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgrid_metrics::{RawSample, StaticSource};
    use flowgrid_sink::RecordingSink;

    fn resource() -> RouteResource {
        RouteResource {
            kind: "virtualservice".to_string(),
            name: "api".to_string(),
            namespace: "default".to_string(),
            group: 0,
        }
    }

    fn source(utils: &[(&str, f64)]) -> StaticSource {
        let q = MetricQueries::default();
        StaticSource::new().with_series(
            &q.utilization,
            utils
                .iter()
                .map(|(pod, v)| RawSample::new([("pod", *pod)], *v))
                .collect(),
        )
    }

    fn routes(names: &[&str]) -> Vec<RouteEntry> {
        names.iter().map(|n| RouteEntry::new(*n, None)).collect()
    }

    #[tokio::test]
    async fn plan_does_not_touch_the_sink() {
        let c = Controller::new(
            source(&[("a", 0.0), ("b", 0.0)]),
            RecordingSink::new(routes(&["a", "b"])),
            resource(),
        );

        let report = c.plan().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Planned);
        assert_eq!(report.weights.total(), 100);
        assert!(c.sink().applied().is_empty());
    }

    #[tokio::test]
    async fn run_once_applies_and_then_reports_unchanged() {
        let c = Controller::new(
            source(&[("a", 0.0), ("b", 100.0)]),
            RecordingSink::new(routes(&["a", "b"])),
            resource(),
        );

        // a: 100, b: 100 - 30 = 70 → 58.8 / 41.2 → 59 / 41
        let first = c.run_once().await.unwrap();
        assert_eq!(first.outcome, PassOutcome::Applied);
        assert_eq!(first.weights.get(&Target::from("a")), Some(59));
        assert_eq!(first.weights.get(&Target::from("b")), Some(41));

        let second = c.run_once().await.unwrap();
        assert_eq!(second.outcome, PassOutcome::Unchanged);
        assert_eq!(second.patch, first.patch);
        assert_eq!(c.sink().applied().len(), 1);
    }

    #[tokio::test]
    async fn unobserved_and_unrouted_targets_are_reported() {
        let c = Controller::new(
            source(&[("a", 10.0), ("x", 10.0)]),
            RecordingSink::new(routes(&["a", "b"])),
            resource(),
        );

        let report = c.plan().await.unwrap();
        assert_eq!(report.unobserved, vec![Target::from("b")]);
        assert_eq!(report.unrouted, vec![Target::from("x")]);
        assert_eq!(report.weights.get(&Target::from("a")), Some(100));
        assert_eq!(report.weights.get(&Target::from("b")), Some(0));
    }

    #[tokio::test]
    async fn empty_route_group_is_a_no_op() {
        let c = Controller::new(source(&[("a", 1.0)]), RecordingSink::new(Vec::new()), resource());

        let report = c.run_once().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::NoRoutes);
        assert!(report.patch.is_empty());
        assert!(c.sink().applied().is_empty());
    }

    #[tokio::test]
    async fn expected_order_must_match_live_routes() {
        let c = Controller::new(
            source(&[("a", 1.0), ("b", 1.0)]),
            RecordingSink::new(routes(&["b", "a"])),
            resource(),
        )
        .with_expected_order(vec![Target::from("a"), Target::from("b")]);

        let err = c.run_once().await.unwrap_err();
        assert!(matches!(err, ControllerError::RouteOrderMismatch(_)));
        assert!(c.sink().applied().is_empty());
    }

    #[tokio::test]
    async fn duplicate_route_destinations_are_rejected() {
        let c = Controller::new(
            source(&[("a", 1.0)]),
            RecordingSink::new(routes(&["a", "a"])),
            resource(),
        );
        assert!(matches!(
            c.plan().await,
            Err(ControllerError::RouteOrderMismatch(_))
        ));
    }

    #[tokio::test]
    async fn lock_dir_blocks_concurrent_process() {
        let dir = tempfile::tempdir().unwrap();
        let c = Controller::new(
            source(&[("a", 1.0)]),
            RecordingSink::new(routes(&["a"])),
            resource(),
        )
        .with_lock_dir(dir.path().to_path_buf(), Duration::from_secs(600));

        let held = PassLock::acquire(dir.path(), &resource(), Duration::from_secs(600)).unwrap();
        assert!(matches!(c.run_once().await, Err(ControllerError::Busy { .. })));

        drop(held);
        c.run_once().await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let c = Controller::new(
            source(&[("a", 1.0)]),
            RecordingSink::new(routes(&["a"])),
            resource(),
        );
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(c.run(Duration::from_secs(3600), rx), stopper);

        assert_eq!(c.sink().applied().len(), 1);
    }

    #[test]
    fn format_weights_lists_pairs() {
        let n = Normalized {
            weights: vec![(Target::from("a"), 40), (Target::from("b"), 60)],
            degenerate: false,
        };
        assert_eq!(format_weights(&n), "a=40,b=60");
    }
}
