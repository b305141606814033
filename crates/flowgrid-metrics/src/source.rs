//! The metrics source seam and the per-pass snapshot fetch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::debug;

use flow_core::MetricKind;
use flow_core::config::MetricsConfig;

use crate::error::{MetricsError, MetricsResult};

/// One series returned by an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl RawSample {
    pub fn new<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>, value: f64) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }
}

/// A backend that answers instant queries.
///
/// Given a query string and an optional evaluation time, return every
/// series with its labels and one numeric value.
pub trait MetricsSource {
    fn query(
        &self,
        query: &str,
        at: Option<SystemTime>,
    ) -> impl Future<Output = MetricsResult<Vec<RawSample>>> + Send;
}

/// The three queries issued per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQueries {
    pub utilization: String,
    pub memory: String,
    pub power: String,
}

impl MetricQueries {
    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            utilization: config.utilization_query.clone(),
            memory: config.memory_query.clone(),
            power: config.power_query.clone(),
        }
    }

    pub fn get(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::Utilization => &self.utilization,
            MetricKind::Memory => &self.memory,
            MetricKind::Power => &self.power,
        }
    }
}

impl Default for MetricQueries {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

/// Raw query results for one pass, before identity resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub utilization: Vec<RawSample>,
    pub memory: Vec<RawSample>,
    pub power: Vec<RawSample>,
}

impl RawSnapshot {
    pub fn get(&self, kind: MetricKind) -> &[RawSample] {
        match kind {
            MetricKind::Utilization => &self.utilization,
            MetricKind::Memory => &self.memory,
            MetricKind::Power => &self.power,
        }
    }

    fn slot_mut(&mut self, kind: MetricKind) -> &mut Vec<RawSample> {
        match kind {
            MetricKind::Utilization => &mut self.utilization,
            MetricKind::Memory => &mut self.memory,
            MetricKind::Power => &mut self.power,
        }
    }
}

/// Run all three queries, each bounded by `timeout`.
///
/// Any failure aborts the whole fetch; a partial snapshot is never returned.
pub async fn fetch_snapshot<S: MetricsSource>(
    source: &S,
    queries: &MetricQueries,
    at: Option<SystemTime>,
    timeout: Duration,
) -> MetricsResult<RawSnapshot> {
    let mut snapshot = RawSnapshot::default();
    for kind in MetricKind::ALL {
        let query = queries.get(kind);
        let samples = tokio::time::timeout(timeout, source.query(query, at))
            .await
            .map_err(|_| MetricsError::Timeout(timeout))??;
        debug!(metric = kind.label(), %query, series = samples.len(), "query returned");
        *snapshot.slot_mut(kind) = samples;
    }
    Ok(snapshot)
}

/// In-memory source answering from canned series.
///
/// Unknown queries return no series. Queries marked with [`fail_on`]
/// return a `Query` error.
///
/// [`fail_on`]: StaticSource::fail_on
#[derive(Debug, Default)]
pub struct StaticSource {
    series: HashMap<String, Vec<RawSample>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, query: &str, samples: Vec<RawSample>) -> Self {
        self.series.insert(query.to_string(), samples);
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// Queries received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MetricsSource for StaticSource {
    async fn query(&self, query: &str, _at: Option<SystemTime>) -> MetricsResult<Vec<RawSample>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        if self.failing.contains(query) {
            return Err(MetricsError::Query {
                query: query.to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        Ok(self.series.get(query).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource;

    impl MetricsSource for SlowSource {
        async fn query(&self, _query: &str, _at: Option<SystemTime>) -> MetricsResult<Vec<RawSample>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn fetch_runs_all_three_queries() {
        let queries = MetricQueries::default();
        let source = StaticSource::new()
            .with_series(&queries.utilization, vec![RawSample::new([("pod", "a")], 10.0)])
            .with_series(&queries.power, vec![RawSample::new([("pod", "a")], 90.0)]);

        let snap = fetch_snapshot(&source, &queries, None, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(snap.utilization.len(), 1);
        assert!(snap.memory.is_empty());
        assert_eq!(snap.get(MetricKind::Power)[0].value, 90.0);
        assert_eq!(
            source.calls(),
            vec![
                "DCGM_FI_DEV_GPU_UTIL{}".to_string(),
                "DCGM_FI_DEV_MEM_COPY_UTIL{}".to_string(),
                "DCGM_FI_DEV_POWER_USAGE{}".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn fetch_fails_when_any_query_fails() {
        let queries = MetricQueries::default();
        let source = StaticSource::new().fail_on(&queries.memory);

        let err = fetch_snapshot(&source, &queries, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Query { .. }));
        // Power is never queried once memory failed.
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_is_bounded_by_timeout() {
        let err = fetch_snapshot(
            &SlowSource,
            &MetricQueries::default(),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MetricsError::Timeout(d) if d == Duration::from_secs(5)));
    }
}
