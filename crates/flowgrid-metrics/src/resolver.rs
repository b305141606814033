//! Series label → `Target` resolution.
//!
//! This is the only place a label name is consulted. The utilization
//! query defines the set of observed targets; memory and power series
//! only attach to targets it produced.

use tracing::debug;

use flow_core::config::MetricsConfig;
use flow_core::{MetricKind, Target};

use crate::source::{RawSample, RawSnapshot};
use crate::store::SampleSet;

#[derive(Debug, Clone)]
pub struct TargetResolver {
    target_label: String,
    prefix: Option<String>,
    model_label: String,
}

impl TargetResolver {
    pub fn new(target_label: &str, prefix: Option<&str>, model_label: &str) -> Self {
        Self {
            target_label: target_label.to_string(),
            prefix: prefix.map(str::to_string),
            model_label: model_label.to_string(),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(
            &config.target_label,
            config.target_prefix.as_deref(),
            &config.model_label,
        )
    }

    /// The target a series belongs to, if it carries an eligible identity.
    pub fn identify(&self, sample: &RawSample) -> Option<Target> {
        let id = sample.labels.get(&self.target_label)?;
        if id.is_empty() {
            return None;
        }
        match &self.prefix {
            Some(prefix) if !id.starts_with(prefix.as_str()) => None,
            _ => Some(Target::from(id.as_str())),
        }
    }

    pub fn resolve(&self, snapshot: &RawSnapshot) -> SampleSet {
        let mut set = SampleSet::new();

        for raw in &snapshot.utilization {
            let Some(target) = self.identify(raw) else {
                continue;
            };
            let model = raw.labels.get(&self.model_label).cloned();
            set.observe(target.clone(), model);
            set.record(&target, MetricKind::Utilization, raw.value);
        }

        for kind in [MetricKind::Memory, MetricKind::Power] {
            for raw in snapshot.get(kind) {
                let Some(target) = self.identify(raw) else {
                    continue;
                };
                if !set.record(&target, kind, raw.value) {
                    debug!(%target, metric = kind.label(), "series for unobserved target ignored");
                }
            }
        }

        set
    }
}
