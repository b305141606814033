//! Per-target fitness scores.

use serde::Serialize;
use tracing::debug;

use flow_core::{MetricKind, MetricSample, RatingTable, ScoreWeights, Target};
use flowgrid_metrics::SampleSet;

/// Scores targets from their static rating and current load.
///
/// Holds the score weights and rating table for the lifetime of the
/// controller; both come from configuration.
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    weights: ScoreWeights,
    ratings: RatingTable,
}

/// How one target's score came about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub target: Target,
    pub rating: f64,
    pub sample: MetricSample,
    /// Metrics that had no series and were read as 0.
    pub missing: Vec<MetricKind>,
    pub score: f64,
}

impl ScoreEngine {
    pub fn new(weights: ScoreWeights, ratings: RatingTable) -> Self {
        Self { weights, ratings }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// `max(0, Wp*rating - Wu*util - Wm*mem - Ww*power)`.
    ///
    /// A NaN or infinite result scores 0.
    pub fn score(&self, rating: f64, util: f64, mem: f64, power: f64) -> f64 {
        let w = &self.weights;
        let raw = w.performance * rating - w.utilization * util - w.memory * mem - w.power * power;
        if raw.is_finite() { raw.max(0.0) } else { 0.0 }
    }

    pub fn score_target(&self, target: &Target, samples: &SampleSet) -> ScoreBreakdown {
        let sample = samples.sample(target);
        let missing = samples.missing(target);
        let rating = self.ratings.rating(target, samples.model(target));
        let score = self.score(rating, sample.utilization, sample.memory, sample.power);

        if !missing.is_empty() {
            debug!(
                %target,
                missing = ?missing.iter().map(|k| k.label()).collect::<Vec<_>>(),
                "metrics missing, read as 0"
            );
        }
        debug!(%target, rating, score, "scored");

        ScoreBreakdown {
            target: target.clone(),
            rating,
            sample,
            missing,
            score,
        }
    }

    /// Score every observed target, in target order.
    pub fn score_all(&self, samples: &SampleSet) -> Vec<ScoreBreakdown> {
        samples
            .targets()
            .map(|t| self.score_target(t, samples))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ScoreEngine {
        ScoreEngine::default()
    }

    #[test]
    fn score_matches_formula() {
        // 100*1.4 - 0.3*50 - 0.2*20 - 0.1*150 = 140 - 15 - 4 - 15 = 106
        let s = engine().score(1.4, 50.0, 20.0, 150.0);
        assert!((s - 106.0).abs() < 1e-9);
    }

    #[test]
    fn score_clamps_at_zero() {
        // 100 - 30 - 20 - 100 = -50 → 0
        assert_eq!(engine().score(1.0, 100.0, 100.0, 1000.0), 0.0);
    }

    #[test]
    fn score_is_never_negative() {
        let e = engine();
        for rating in [0.0, 0.5, 1.0, 1.4, 10.0] {
            for util in [0.0, 25.0, 100.0] {
                for mem in [0.0, 50.0, 100.0] {
                    for power in [0.0, 120.0, 450.0, 1e9] {
                        assert!(e.score(rating, util, mem, power) >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn non_finite_result_scores_zero() {
        assert_eq!(engine().score(f64::INFINITY, 0.0, 0.0, f64::INFINITY), 0.0);
        assert_eq!(engine().score(f64::NAN, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn custom_weights_are_used() {
        let e = ScoreEngine::new(
            ScoreWeights {
                performance: 10.0,
                utilization: 1.0,
                memory: 0.0,
                power: 0.0,
            },
            RatingTable::default(),
        );
        assert_eq!(e.score(2.0, 5.0, 99.0, 99.0), 15.0);
    }

    #[test]
    fn score_target_reads_rating_and_missing_metrics() {
        let mut samples = SampleSet::new();
        let t = Target::from("pod-a");
        samples.observe(t.clone(), Some("NVIDIA GeForce RTX 4070".to_string()));
        samples.record(&t, MetricKind::Utilization, 10.0);

        let b = engine().score_target(&t, &samples);
        assert_eq!(b.rating, 1.4);
        assert_eq!(b.missing, vec![MetricKind::Memory, MetricKind::Power]);
        assert!((b.score - 137.0).abs() < 1e-9);
    }

    #[test]
    fn score_all_covers_every_target() {
        let mut samples = SampleSet::new();
        samples.observe(Target::from("b"), None);
        samples.observe(Target::from("a"), None);

        let all = engine().score_all(&samples);
        let names: Vec<&str> = all.iter().map(|b| b.target.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(all.iter().all(|b| b.score == 100.0));
    }
}
