//! Temperature scheduling.
//!
//! Temperatures are either supplied manually or calibrated from the
//! distribution of worsening cost deltas observed on a short Metropolis
//! walk from the seed solution. Calibration picks the start temperature at
//! which a typical worsening move is accepted with probability
//! [`START_ACCEPTANCE`], and the end temperature at [`END_ACCEPTANCE`].

use crate::error::{Error, Result};
use crate::rng::create_rng;
use crate::sa::SaProblem;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Target mean acceptance of worsening moves at the start temperature.
pub const START_ACCEPTANCE: f64 = 0.8;

/// Target mean acceptance of worsening moves at the end temperature.
pub const END_ACCEPTANCE: f64 = 0.01;

/// Default number of trial proposals made during calibration.
pub const CALIBRATION_SAMPLES: usize = 200;

/// Schedule used when calibration observes no worsening move.
const FALLBACK: TemperatureSchedule = TemperatureSchedule {
    start: 1.0,
    end: 0.01,
};

const BISECTION_STEPS: usize = 100;

/// Start and end temperatures of an annealing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSchedule {
    pub start: f64,
    pub end: f64,
}

impl TemperatureSchedule {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Requires `start > end > 0`.
    pub fn validate(&self) -> Result<()> {
        if !(self.end > 0.0 && self.start.is_finite()) {
            return Err(Error::config(format!(
                "temperatures must be positive and finite, got start={} end={}",
                self.start, self.end
            )));
        }
        if self.start <= self.end {
            return Err(Error::config(format!(
                "start temperature ({}) must exceed end temperature ({})",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// How the schedule of a run is obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureMode {
    /// Calibrate from trial perturbations on the first frame.
    Auto,
    /// Use the given schedule unchanged.
    Manual(TemperatureSchedule),
}

impl TemperatureMode {
    /// Resolves the caller's temperature parameters.
    ///
    /// Auto mode and manual temperatures are mutually exclusive; manual mode
    /// needs both temperatures with `start > end > 0`.
    pub fn resolve(auto: bool, start: Option<f64>, end: Option<f64>) -> Result<Self> {
        match (auto, start, end) {
            (true, None, None) => Ok(TemperatureMode::Auto),
            (true, _, _) => Err(Error::config(
                "start/end temperatures must not be set when auto temperature scheduling is enabled",
            )),
            (false, Some(start), Some(end)) => {
                let schedule = TemperatureSchedule::new(start, end);
                schedule.validate()?;
                Ok(TemperatureMode::Manual(schedule))
            }
            (false, _, _) => Err(Error::config(
                "manual temperature scheduling needs both start and end temperatures",
            )),
        }
    }
}

/// Calibrates a schedule for `problem` from `seed`.
///
/// Runs `samples` neighbour proposals as a Metropolis walk at a reference
/// temperature ten times the running mean of the worsening deltas, records
/// every positive delta, and solves `mean(exp(-d / T)) = target` for the
/// start and end targets. Deterministic for a fixed `rng_seed`.
pub fn auto_temp_schedule<P: SaProblem>(
    problem: &P,
    seed: &P::Solution,
    samples: usize,
    rng_seed: u64,
) -> TemperatureSchedule {
    let deltas = sample_worsening_deltas(problem, seed, samples, rng_seed);
    if deltas.is_empty() {
        tracing::warn!(
            samples,
            "calibration observed no worsening move; using fallback schedule"
        );
        return FALLBACK;
    }

    let start = solve_temperature(&deltas, START_ACCEPTANCE);
    let mut end = solve_temperature(&deltas, END_ACCEPTANCE);
    if end >= start {
        end = start * END_ACCEPTANCE;
    }
    tracing::debug!(observed = deltas.len(), start, end, "calibrated temperatures");
    TemperatureSchedule::new(start, end)
}

fn sample_worsening_deltas<P: SaProblem>(
    problem: &P,
    seed: &P::Solution,
    samples: usize,
    rng_seed: u64,
) -> Vec<f64> {
    let mut rng = create_rng(rng_seed);
    let mut current = seed.clone();
    let mut current_cost = problem.cost(&current);
    let mut deltas = Vec::new();
    let mut sum = 0.0;

    for _ in 0..samples {
        let candidate = problem.neighbor(&current, &mut rng);
        let cost = problem.cost(&candidate);
        let delta = cost - current_cost;

        let accept = if delta <= 0.0 {
            true
        } else {
            deltas.push(delta);
            sum += delta;
            let reference = 10.0 * sum / deltas.len() as f64;
            rng.random_range(0.0..1.0) < (-delta / reference).exp()
        };
        if accept {
            current = candidate;
            current_cost = cost;
        }
    }
    deltas
}

/// Mean Metropolis acceptance of `deltas` at temperature `t`.
pub fn mean_acceptance(deltas: &[f64], t: f64) -> f64 {
    if deltas.is_empty() {
        return 1.0;
    }
    deltas.iter().map(|d| (-d / t).exp()).sum::<f64>() / deltas.len() as f64
}

/// Bisection on `ln T` for the temperature with the target mean acceptance.
fn solve_temperature(deltas: &[f64], target: f64) -> f64 {
    let min = deltas.iter().copied().fold(f64::INFINITY, f64::min);
    let max = deltas.iter().copied().fold(0.0, f64::max);
    let mut lo = (min * 1e-3).max(f64::MIN_POSITIVE).ln();
    let mut hi = (max * 1e3).ln();
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if mean_acceptance(deltas, mid.exp()) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (0.5 * (lo + hi)).exp()
}
