//! Global optimization.
//!
//! Treats the whole frame sequence as one search space: the state is a
//! [`Trajectory`] holding one colony per frame, and the cost adds a
//! continuity penalty between consecutive frames to the per-frame image
//! objective. Driven by the same [`SaRunner`] as the per-frame jobs.
//!
//! Cell identities are fixed across the trajectory; no split or combine
//! proposals are made.

use crate::colony::Colony;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::sa::{SaConfig, SaProblem, SaRunner};
use crate::temperature::TemperatureSchedule;
use crate::worker::WorkerSettings;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Probability that a perturbation is carried forward into following frames.
const PROPAGATE_PROBABILITY: f64 = 0.5;

/// One colony per frame.
#[derive(Debug, Clone)]
pub struct Trajectory {
    frames: Vec<Colony>,
}

impl Trajectory {
    /// Copies `colony` into each of `frames` frames.
    pub fn replicate(colony: &Colony, frames: usize) -> Self {
        Self {
            frames: vec![colony.clone(); frames],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Colony] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Colony> {
        self.frames
    }

    /// Total number of cell observations.
    pub fn cells(&self) -> usize {
        self.frames.iter().map(Colony::len).sum()
    }
}

/// Fits a trajectory to a frame sequence.
pub struct TrajectoryProblem<'a> {
    images: &'a [Arc<Frame>],
    settings: &'a WorkerSettings,
    continuity_weight: f64,
}

impl<'a> TrajectoryProblem<'a> {
    pub fn new(
        images: &'a [Arc<Frame>],
        settings: &'a WorkerSettings,
        continuity_weight: f64,
    ) -> Self {
        Self {
            images,
            settings,
            continuity_weight,
        }
    }

    /// Continuity penalty between two consecutive colonies, summed over
    /// the cell names present in both.
    pub fn continuity(&self, a: &Colony, b: &Colony) -> f64 {
        a.iter()
            .filter_map(|node| {
                b.get(node.name())
                    .map(|next| self.settings.model.continuity(&node.cell, &next.cell))
            })
            .sum()
    }

    /// Iteration budget for `trajectory`.
    pub fn budget(&self, trajectory: &Trajectory) -> usize {
        self.settings.iterations_per_cell * trajectory.cells().max(1)
    }
}

impl SaProblem for TrajectoryProblem<'_> {
    type Solution = Trajectory;

    fn cost(&self, trajectory: &Trajectory) -> f64 {
        let fit: f64 = trajectory
            .frames
            .iter()
            .zip(self.images)
            .map(|(colony, image)| {
                self.settings
                    .objective
                    .cost(colony, image, self.settings.palette)
            })
            .sum();
        let jumps: f64 = trajectory
            .frames
            .windows(2)
            .map(|pair| self.continuity(&pair[0], &pair[1]))
            .sum();
        fit + self.continuity_weight * jumps
    }

    fn neighbor<R: Rng>(&self, trajectory: &Trajectory, rng: &mut R) -> Trajectory {
        let mut next = trajectory.clone();
        if next.is_empty() {
            return next;
        }
        let f = rng.random_range(0..next.len());
        if next.frames[f].is_empty() {
            return next;
        }

        let i = rng.random_range(0..next.frames[f].len());
        let old = next.frames[f].node(i).cell.clone();
        let moved = self.settings.model.perturb(&old, rng, 1.0);
        let delta: Vec<f64> = moved
            .values()
            .iter()
            .zip(old.values())
            .map(|(new, old)| new - old)
            .collect();
        next.frames[f].replace(i, moved);

        let remaining = next.len() - f - 1;
        if remaining > 0 && rng.random_range(0.0..1.0) < PROPAGATE_PROBABILITY {
            let run = rng.random_range(1..=remaining);
            for colony in &mut next.frames[f + 1..=f + run] {
                let Some(k) = colony.position(old.name()) else {
                    continue;
                };
                let displaced = colony.node(k).cell.displaced(&delta);
                if self.settings.model.is_valid(&displaced) {
                    colony.replace(k, displaced);
                }
            }
        }
        next
    }
}

/// Anneals `initial` and returns the best trajectory found with its cost.
pub fn optimize(
    problem: &TrajectoryProblem<'_>,
    initial: Trajectory,
    schedule: TemperatureSchedule,
    rng_seed: u64,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(Trajectory, f64)> {
    if initial.len() != problem.images.len() {
        return Err(Error::input(format!(
            "trajectory has {} frames but {} images were given",
            initial.len(),
            problem.images.len()
        )));
    }

    let config = SaConfig::new(schedule)
        .with_cooling(problem.settings.cooling)
        .with_max_iterations(problem.budget(&initial))
        .with_seed(rng_seed);
    tracing::info!(
        frames = initial.len(),
        cells = initial.cells(),
        iterations = config.max_iterations,
        "global optimization started"
    );

    let result = SaRunner::run_with_cancel(problem, initial, &config, cancel)?;
    if result.cancelled {
        return Err(Error::Interrupted);
    }
    tracing::info!(
        cost = result.best_cost,
        accepted = result.accepted_moves,
        "global optimization finished"
    );
    Ok((result.best, result.best_cost))
}
