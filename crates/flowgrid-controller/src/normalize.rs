//! Scores → integer percentages.
//!
//! Weights are `floor(score / total * 100)` per target. The points lost
//! to flooring go one at a time to the targets with the largest
//! fractional remainder (ties: higher score, then earlier position), so a
//! non-empty result always sums to exactly 100. When every score is zero
//! the targets share traffic equally.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use flow_core::{Target, non_negative};

const FULL: u32 = 100;

/// Weights in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Normalized {
    pub weights: Vec<(Target, u32)>,
    /// Every score was zero and the equal split was used.
    pub degenerate: bool,
}

impl Normalized {
    pub fn total(&self) -> u32 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn get(&self, target: &Target) -> Option<u32> {
        self.weights
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, w)| *w)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Distribute 100 points over `order` in proportion to `scores`.
///
/// Targets absent from `scores` score 0. Negative and non-finite scores
/// count as 0.
pub fn normalize(scores: &HashMap<Target, f64>, order: &[Target]) -> Normalized {
    if order.is_empty() {
        return Normalized::default();
    }

    let mut values: Vec<f64> = order
        .iter()
        .map(|t| scores.get(t).copied().map(non_negative).unwrap_or(0.0))
        .collect();
    let mut total: f64 = values.iter().sum();

    if total.is_infinite() {
        // Each value is finite but the sum overflowed; rescale.
        let max = values.iter().copied().fold(0.0, f64::max);
        values.iter_mut().for_each(|v| *v /= max);
        total = values.iter().sum();
    }

    if total <= 0.0 {
        warn!(targets = order.len(), "all scores are zero, splitting traffic equally");
        return Normalized {
            weights: equal_split(order),
            degenerate: true,
        };
    }

    let exact: Vec<f64> = values
        .iter()
        .map(|v| v / total * f64::from(FULL))
        .collect();
    let mut weights: Vec<u32> = exact.iter().map(|e| e.floor() as u32).collect();
    let remainders: Vec<f64> = exact
        .iter()
        .zip(&weights)
        .map(|(e, w)| e - f64::from(*w))
        .collect();

    // Rank positions: largest remainder, then highest score, then earliest.
    let mut ranking: Vec<usize> = (0..order.len()).collect();
    ranking.sort_by(|&a, &b| {
        remainders[b]
            .total_cmp(&remainders[a])
            .then_with(|| values[b].total_cmp(&values[a]))
            .then(a.cmp(&b))
    });

    let sum: u32 = weights.iter().sum();
    match sum.cmp(&FULL) {
        Ordering::Less => {
            for i in ranking.iter().cycle().take((FULL - sum) as usize) {
                weights[*i] += 1;
            }
        }
        Ordering::Greater => {
            // Only reachable through float error; take back from the
            // lowest-ranked positions that still hold points.
            let mut excess = sum - FULL;
            for i in ranking.iter().rev().cycle() {
                if excess == 0 {
                    break;
                }
                if weights[*i] > 0 {
                    weights[*i] -= 1;
                    excess -= 1;
                }
            }
        }
        Ordering::Equal => {}
    }

    Normalized {
        weights: order.iter().cloned().zip(weights).collect(),
        degenerate: false,
    }
}

/// `100 / n` each; the first `100 % n` targets get one more.
fn equal_split(order: &[Target]) -> Vec<(Target, u32)> {
    let n = order.len() as u32;
    let base = FULL / n;
    let extra = (FULL % n) as usize;
    order
        .iter()
        .enumerate()
        .map(|(i, t)| (t.clone(), base + u32::from(i < extra)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(names: &[&str]) -> Vec<Target> {
        names.iter().map(|n| Target::from(*n)).collect()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<Target, f64> {
        pairs.iter().map(|(n, s)| (Target::from(*n), *s)).collect()
    }

    fn values(n: &Normalized) -> Vec<u32> {
        n.weights.iter().map(|(_, w)| *w).collect()
    }

    #[test]
    fn exact_proportions() {
        let n = normalize(&scores(&[("a", 40.0), ("b", 60.0)]), &targets(&["a", "b"]));
        assert_eq!(values(&n), vec![40, 60]);
        assert!(!n.degenerate);
    }

    #[test]
    fn residual_goes_to_first_on_equal_scores() {
        let n = normalize(
            &scores(&[("a", 1.0), ("b", 1.0), ("c", 1.0)]),
            &targets(&["a", "b", "c"]),
        );
        assert_eq!(values(&n), vec![34, 33, 33]);
        assert_eq!(n.total(), 100);
    }

    #[test]
    fn residual_follows_largest_remainder() {
        // Exact shares: 16.67, 33.33, 50.0 → floors 16, 33, 50 → +1 to a.
        let n = normalize(
            &scores(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]),
            &targets(&["a", "b", "c"]),
        );
        assert_eq!(values(&n), vec![17, 33, 50]);
    }

    #[test]
    fn all_zero_scores_split_equally() {
        let n = normalize(&scores(&[("a", 0.0), ("b", 0.0)]), &targets(&["a", "b"]));
        assert_eq!(values(&n), vec![50, 50]);
        assert!(n.degenerate);

        let n = normalize(&HashMap::new(), &targets(&["a", "b", "c"]));
        assert_eq!(values(&n), vec![34, 33, 33]);
        assert!(n.degenerate);
    }

    #[test]
    fn missing_and_invalid_scores_count_as_zero() {
        let n = normalize(
            &scores(&[("a", 10.0), ("b", f64::NAN), ("c", -5.0)]),
            &targets(&["a", "b", "c", "d"]),
        );
        assert_eq!(values(&n), vec![100, 0, 0, 0]);
    }

    #[test]
    fn output_follows_given_order() {
        let s = scores(&[("a", 10.0), ("b", 30.0)]);
        let n = normalize(&s, &targets(&["b", "a"]));
        assert_eq!(n.weights[0], (Target::from("b"), 75));
        assert_eq!(n.weights[1], (Target::from("a"), 25));
        assert_eq!(n.get(&Target::from("a")), Some(25));
        assert_eq!(n.get(&Target::from("zz")), None);
    }

    #[test]
    fn empty_order_is_empty() {
        let n = normalize(&scores(&[("a", 1.0)]), &[]);
        assert!(n.is_empty());
        assert!(!n.degenerate);
    }

    #[test]
    fn huge_scores_still_sum_to_hundred() {
        let n = normalize(
            &scores(&[("a", f64::MAX), ("b", f64::MAX), ("c", 1.0)]),
            &targets(&["a", "b", "c"]),
        );
        assert_eq!(n.total(), 100);
        assert_eq!(values(&n), vec![50, 50, 0]);
    }

    #[test]
    fn many_targets_always_sum_to_hundred() {
        for n in 1..=150usize {
            let order: Vec<Target> = (0..n).map(|i| Target::new(format!("t{i}"))).collect();
            let s: HashMap<Target, f64> = order
                .iter()
                .enumerate()
                .map(|(i, t)| (t.clone(), ((i * 7919) % 97) as f64 + 0.37))
                .collect();
            let result = normalize(&s, &order);
            assert_eq!(result.total(), 100, "n = {n}");
            assert_eq!(result.weights.len(), n);
        }
    }

    #[test]
    fn more_targets_than_points_split_equally() {
        let order: Vec<Target> = (0..120).map(|i| Target::new(format!("t{i}"))).collect();
        let n = normalize(&HashMap::new(), &order);
        assert_eq!(n.total(), 100);
        assert_eq!(n.weights[99].1, 1);
        assert_eq!(n.weights[100].1, 0);
    }
}
