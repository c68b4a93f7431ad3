//! Result aggregation.
//!
//! Reduces the job results of one frame to the single colony committed for
//! that frame: keep the `K` lowest-cost results, then apply a [`Strategy`].
//! Results are ordered by `(cost, job_id)`, so the outcome does not depend
//! on the order in which jobs finished.

use crate::error::{Error, Result};
use crate::worker::JobResult;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Selection rule applied to the kept results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// The lowest cost.
    #[default]
    BestWins,

    /// The highest cost among the kept results.
    WorstWins,

    /// Whichever of the lowest and highest cost lies further from the kept
    /// mean. Ties go to the lowest cost.
    ExtremeWins,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best-wins" => Ok(Strategy::BestWins),
            "worst-wins" => Ok(Strategy::WorstWins),
            "extreme-wins" => Ok(Strategy::ExtremeWins),
            other => Err(Error::config(format!(
                "unknown strategy \"{other}\" (expected best-wins, worst-wins or extreme-wins)"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::BestWins => "best-wins",
            Strategy::WorstWins => "worst-wins",
            Strategy::ExtremeWins => "extreme-wins",
        })
    }
}

fn by_cost(a: &JobResult, b: &JobResult) -> Ordering {
    a.cost
        .partial_cmp(&b.cost)
        .unwrap_or(Ordering::Equal)
        .then(a.job_id.cmp(&b.job_id))
}

/// Index of the selected result within `kept`, which must be sorted by
/// cost and non-empty.
fn select(kept: &[JobResult], strategy: Strategy) -> usize {
    let last = kept.len() - 1;
    match strategy {
        Strategy::BestWins => 0,
        Strategy::WorstWins => last,
        Strategy::ExtremeWins => {
            let mean = kept.iter().map(|r| r.cost).sum::<f64>() / kept.len() as f64;
            let low = (kept[0].cost - mean).abs();
            let high = (kept[last].cost - mean).abs();
            if high > low {
                last
            } else {
                0
            }
        }
    }
}

/// Selects the result committed for `frame`.
///
/// Fails with [`Error::AllJobsFailed`] when `results` is empty.
pub fn aggregate(
    mut results: Vec<JobResult>,
    keep: usize,
    strategy: Strategy,
    frame: usize,
) -> Result<JobResult> {
    if results.is_empty() {
        return Err(Error::AllJobsFailed { frame, jobs: 0 });
    }
    results.sort_by(by_cost);
    results.truncate(keep.max(1));
    let index = select(&results, strategy);
    Ok(results.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use proptest::prelude::{prop, Just};
    use proptest::strategy::Strategy as _;
    use proptest::{prop_assert, prop_assert_eq, prop_oneof, proptest};

    fn results(costs: &[f64]) -> Vec<JobResult> {
        costs
            .iter()
            .enumerate()
            .map(|(job_id, &cost)| JobResult {
                colony: Colony::new(),
                cost,
                job_id,
            })
            .collect()
    }

    fn pick(costs: &[f64], keep: usize, strategy: Strategy) -> f64 {
        aggregate(results(costs), keep, strategy, 0).unwrap().cost
    }

    #[test]
    fn test_reference_costs() {
        let costs = [10.0, 12.0, 15.0, 20.0];
        assert_eq!(pick(&costs, 2, Strategy::BestWins), 10.0);
        assert_eq!(pick(&costs, 2, Strategy::WorstWins), 12.0);
        // mean 11: both deviate by 1, tie goes to the best.
        assert_eq!(pick(&costs, 2, Strategy::ExtremeWins), 10.0);
    }

    #[test]
    fn test_extreme_prefers_outlier() {
        // kept {1, 9, 10}, mean 6.67: |1 - m| = 5.67 > |10 - m| = 3.33
        assert_eq!(pick(&[10.0, 1.0, 9.0, 30.0], 3, Strategy::ExtremeWins), 1.0);
        // kept {1, 2, 10}, mean 4.33: |10 - m| = 5.67 > 3.33
        assert_eq!(pick(&[2.0, 10.0, 1.0, 30.0], 3, Strategy::ExtremeWins), 10.0);
    }

    #[test]
    fn test_worst_wins_is_within_kept() {
        assert_eq!(pick(&[5.0, 1.0, 100.0], 2, Strategy::WorstWins), 5.0);
    }

    #[test]
    fn test_arrival_order_irrelevant() {
        let mut a = results(&[3.0, 1.0, 2.0]);
        let mut b = results(&[3.0, 1.0, 2.0]);
        b.reverse();
        a.rotate_left(1);
        let x = aggregate(a, 2, Strategy::WorstWins, 0).unwrap();
        let y = aggregate(b, 2, Strategy::WorstWins, 0).unwrap();
        assert_eq!(x.job_id, y.job_id);
    }

    #[test]
    fn test_equal_costs_break_by_job_id() {
        let selected = aggregate(results(&[4.0, 4.0, 4.0]), 3, Strategy::BestWins, 0).unwrap();
        assert_eq!(selected.job_id, 0);
    }

    #[test]
    fn test_empty_results() {
        assert!(matches!(
            aggregate(Vec::new(), 1, Strategy::BestWins, 7),
            Err(Error::AllJobsFailed { frame: 7, .. })
        ));
    }

    #[test]
    fn test_strategy_parse_round_trip() {
        for s in ["best-wins", "worst-wins", "extreme-wins"] {
            assert_eq!(s.parse::<Strategy>().unwrap().to_string(), s);
        }
        assert!("random-wins".parse::<Strategy>().is_err());
    }

    fn strategy() -> impl proptest::strategy::Strategy<Value = Strategy> {
        prop_oneof![
            Just(Strategy::BestWins),
            Just(Strategy::WorstWins),
            Just(Strategy::ExtremeWins),
        ]
    }

    proptest! {
        #[test]
        fn prop_selection_within_k_lowest(
            costs in prop::collection::vec(0.0f64..1000.0, 1..24),
            keep_seed in 0usize..24,
            strategy in strategy(),
        ) {
            let keep = keep_seed % costs.len() + 1;
            let selected = pick(&costs, keep, strategy);
            let mut sorted = costs.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            prop_assert!(selected <= sorted[keep - 1]);
        }

        #[test]
        fn prop_best_wins_with_all_kept_is_minimum(
            costs in prop::collection::vec(0.0f64..1000.0, 1..24),
        ) {
            let min = costs.iter().copied().fold(f64::INFINITY, f64::min);
            prop_assert_eq!(pick(&costs, costs.len(), Strategy::BestWins), min);
        }
    }
}
