//! SA execution loop.
//!
//! [`Annealer`] is an explicit state machine
//! (`Initializing -> Cooling -> Done`) advanced one iteration per
//! [`Annealer::step`]; [`SaRunner`] drives it to completion.

use super::config::SaConfig;
use super::types::SaProblem;
use crate::error::Result;
use crate::rng::create_rng;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Interval, in iterations, between cost history samples.
const HISTORY_INTERVAL: usize = 100;

/// Result of a Simulated Annealing run.
#[derive(Debug, Clone)]
pub struct SaResult<S: Clone> {
    /// The best solution found.
    pub best: S,

    /// Cost of the best solution.
    pub best_cost: f64,

    /// Total number of iterations (neighbour evaluations).
    pub iterations: usize,

    /// Temperature of the last iteration.
    pub final_temperature: f64,

    /// Number of accepted moves (including improvements).
    pub accepted_moves: usize,

    /// Number of strictly improving moves.
    pub improving_moves: usize,

    /// Whether cancelled externally.
    pub cancelled: bool,

    /// Best cost sampled at regular intervals.
    pub cost_history: Vec<f64>,
}

/// Lifecycle of one annealing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnealState {
    /// Initial cost not yet evaluated.
    Initializing,
    /// Iterating the schedule.
    Cooling,
    /// Budget exhausted, end temperature reached, or cancelled.
    Done,
}

/// One annealing run, advanced step by step.
pub struct Annealer<'a, P: SaProblem> {
    problem: &'a P,
    config: &'a SaConfig,
    rng: StdRng,
    state: AnnealState,
    current: P::Solution,
    current_cost: f64,
    best: P::Solution,
    best_cost: f64,
    iteration: usize,
    temperature: f64,
    accepted_moves: usize,
    improving_moves: usize,
    cancelled: bool,
    cost_history: Vec<f64>,
}

impl<'a, P: SaProblem> Annealer<'a, P> {
    /// Prepares a run from `initial`. The configuration must be valid.
    pub fn new(problem: &'a P, initial: P::Solution, config: &'a SaConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            problem,
            config,
            rng: create_rng(seed),
            state: AnnealState::Initializing,
            best: initial.clone(),
            current: initial,
            current_cost: f64::INFINITY,
            best_cost: f64::INFINITY,
            iteration: 0,
            temperature: config.schedule.start,
            accepted_moves: 0,
            improving_moves: 0,
            cancelled: false,
            cost_history: Vec::new(),
        }
    }

    pub fn state(&self) -> AnnealState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    /// Advances the state machine by one transition.
    pub fn step(&mut self, cancel: Option<&AtomicBool>) -> AnnealState {
        match self.state {
            AnnealState::Initializing => {
                self.current_cost = self.problem.cost(&self.current);
                self.best = self.current.clone();
                self.best_cost = self.current_cost;
                self.cost_history.push(self.best_cost);
                self.state = AnnealState::Cooling;
            }
            AnnealState::Cooling => {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    self.cancelled = true;
                    self.state = AnnealState::Done;
                    return self.state;
                }

                self.temperature = self.config.temperature_at(self.iteration);
                let neighbor = self.problem.neighbor(&self.current, &mut self.rng);
                let neighbor_cost = self.problem.cost(&neighbor);
                let delta = neighbor_cost - self.current_cost;

                // Metropolis acceptance criterion
                let accept = if delta <= 0.0 {
                    if delta < 0.0 {
                        self.improving_moves += 1;
                    }
                    true
                } else {
                    let probability = (-delta / self.temperature).exp();
                    self.rng.random_range(0.0..1.0) < probability
                };

                if accept {
                    self.current = neighbor;
                    self.current_cost = neighbor_cost;
                    self.accepted_moves += 1;

                    if self.current_cost < self.best_cost {
                        self.best = self.current.clone();
                        self.best_cost = self.current_cost;
                    }
                }

                self.iteration += 1;
                if self.iteration.is_multiple_of(HISTORY_INTERVAL) {
                    self.cost_history.push(self.best_cost);
                }

                if self.iteration >= self.config.max_iterations
                    || self.temperature <= self.config.schedule.end
                {
                    self.state = AnnealState::Done;
                }
            }
            AnnealState::Done => {}
        }
        self.state
    }

    /// Consumes the run and reports the incumbent.
    pub fn finish(mut self) -> SaResult<P::Solution> {
        if self
            .cost_history
            .last()
            .is_none_or(|&last| (last - self.best_cost).abs() > 1e-15)
        {
            self.cost_history.push(self.best_cost);
        }

        SaResult {
            best: self.best,
            best_cost: self.best_cost,
            iterations: self.iteration,
            final_temperature: self.temperature,
            accepted_moves: self.accepted_moves,
            improving_moves: self.improving_moves,
            cancelled: self.cancelled,
            cost_history: self.cost_history,
        }
    }
}

/// Executes Simulated Annealing runs to completion.
pub struct SaRunner;

impl SaRunner {
    /// Runs SA from `initial`.
    pub fn run<P: SaProblem>(
        problem: &P,
        initial: P::Solution,
        config: &SaConfig,
    ) -> Result<SaResult<P::Solution>> {
        Self::run_with_cancel(problem, initial, config, None)
    }

    /// Runs SA with an optional cancellation token.
    ///
    /// When the flag is raised the run stops before its next iteration and
    /// returns the incumbent with `cancelled` set.
    pub fn run_with_cancel<P: SaProblem>(
        problem: &P,
        initial: P::Solution,
        config: &SaConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SaResult<P::Solution>> {
        config.validate()?;

        let mut annealer = Annealer::new(problem, initial, config);
        while annealer.step(cancel.as_deref()) != AnnealState::Done {}
        Ok(annealer.finish())
    }
}
