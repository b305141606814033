//! In-memory snapshot of one pass worth of samples.

use std::collections::BTreeMap;

use flow_core::{MetricKind, MetricSample, Target, non_negative};

#[derive(Debug, Clone, Default, PartialEq)]
struct Entry {
    model: Option<String>,
    sums: [f64; 3],
    counts: [u32; 3],
}

fn slot(kind: MetricKind) -> usize {
    match kind {
        MetricKind::Utilization => 0,
        MetricKind::Memory => 1,
        MetricKind::Power => 2,
    }
}

/// Samples keyed by target, iterated in target order.
///
/// A target with several series for the same metric (a pod with more than
/// one GPU) reads as the mean of those series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    entries: BTreeMap<Target, Entry>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target, optionally recording its hardware model.
    pub fn observe(&mut self, target: Target, model: Option<String>) {
        let entry = self.entries.entry(target).or_default();
        if entry.model.is_none() {
            entry.model = model;
        }
    }

    /// Add one series value for an already observed target.
    ///
    /// Returns false, and records nothing, for unknown targets.
    pub fn record(&mut self, target: &Target, kind: MetricKind, value: f64) -> bool {
        match self.entries.get_mut(target) {
            Some(entry) => {
                entry.sums[slot(kind)] += non_negative(value);
                entry.counts[slot(kind)] += 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.entries.contains_key(target)
    }

    /// The sample for `target`. Unknown targets and missing metrics are zero.
    pub fn sample(&self, target: &Target) -> MetricSample {
        let Some(entry) = self.entries.get(target) else {
            return MetricSample::default();
        };
        let mut sample = MetricSample::default();
        for kind in MetricKind::ALL {
            let i = slot(kind);
            if entry.counts[i] > 0 {
                sample.set(kind, entry.sums[i] / f64::from(entry.counts[i]));
            }
        }
        sample
    }

    pub fn model(&self, target: &Target) -> Option<&str> {
        self.entries.get(target).and_then(|e| e.model.as_deref())
    }

    /// Metrics with no series for `target`.
    pub fn missing(&self, target: &Target) -> Vec<MetricKind> {
        match self.entries.get(target) {
            Some(entry) => MetricKind::ALL
                .into_iter()
                .filter(|k| entry.counts[slot(*k)] == 0)
                .collect(),
            None => MetricKind::ALL.to_vec(),
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
