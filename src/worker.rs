//! Annealing worker: one complete job on one frame.
//!
//! A job anneals its own copy of the seed colony against the frame and
//! returns the best colony it observed. The outcome is a pure function of
//! (seed colony, frame, schedule, settings, RNG seed).

use crate::cell::CellModel;
use crate::colony::Colony;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::render::{Objective, Palette};
use crate::sa::{CoolingSchedule, SaConfig, SaProblem, SaRunner};
use crate::temperature::TemperatureSchedule;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Probabilities of structural proposals. The remainder perturbs a cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveProbabilities {
    pub split: f64,
    pub combine: f64,
}

impl MoveProbabilities {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let moves = Self {
            split: config.f64_or("prob.split", 0.0)?,
            combine: config.f64_or("prob.combine", 0.0)?,
        };
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        if !in_unit(moves.split) || !in_unit(moves.combine) || moves.split + moves.combine > 1.0
        {
            return Err(Error::config(
                "\"prob.split\" and \"prob.combine\" must be in [0, 1] and sum to at most 1",
            ));
        }
        Ok(moves)
    }
}

/// Everything a job needs besides the frame, the seed colony and the
/// schedule. Shared read-only by all jobs of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub model: CellModel,
    pub objective: Objective,
    pub palette: Palette,
    pub moves: MoveProbabilities,
    pub iterations_per_cell: usize,
    pub cooling: CoolingSchedule,
}

impl WorkerSettings {
    /// Builds the settings of a run, validating the shape-specific keys.
    pub fn from_config(config: &RunConfig, objective: Objective) -> Result<Self> {
        Ok(Self {
            model: CellModel::from_config(config)?,
            objective,
            palette: Palette::from_config(config)?,
            moves: MoveProbabilities::from_config(config)?,
            iterations_per_cell: config.iterations_per_cell()?,
            cooling: config.cooling()?,
        })
    }

    /// Rejects a colony holding a cell outside the configured shape bounds.
    /// Such a cell can never be perturbed and would stay frozen for the
    /// whole run.
    pub fn check_colony(&self, colony: &Colony) -> Result<()> {
        match colony.cells().find(|cell| !self.model.is_valid(cell)) {
            Some(cell) => Err(Error::input(format!(
                "cell \"{}\" is outside the configured shape bounds",
                cell.name()
            ))),
            None => Ok(()),
        }
    }

    /// The fitting problem of one frame.
    pub fn problem<'a>(&'a self, frame: &'a Frame) -> FrameProblem<'a> {
        FrameProblem {
            frame,
            settings: self,
        }
    }

    /// Iteration budget of one job on a colony of `cells` cells.
    pub fn budget(&self, cells: usize) -> usize {
        self.iterations_per_cell * cells.max(1)
    }
}

/// Fits one colony to one frame.
pub struct FrameProblem<'a> {
    frame: &'a Frame,
    settings: &'a WorkerSettings,
}

impl FrameProblem<'_> {
    fn try_split<R: Rng>(&self, colony: &Colony, rng: &mut R) -> Option<Colony> {
        let i = rng.random_range(0..colony.len());
        let (a, b) = self.settings.model.split(&colony.node(i).cell)?;
        let mut next = colony.clone();
        next.split_at(i, a, b).ok()?;
        Some(next)
    }

    fn try_combine<R: Rng>(&self, colony: &Colony, rng: &mut R) -> Option<Colony> {
        let i = rng.random_range(0..colony.len());
        let a = &colony.node(i).cell;
        let (j, merged) = colony
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .find_map(|(j, n)| self.settings.model.combine(a, &n.cell).map(|m| (j, m)))?;
        let mut next = colony.clone();
        next.combine_at(i, j, merged).ok()?;
        Some(next)
    }
}

impl SaProblem for FrameProblem<'_> {
    type Solution = Colony;

    fn cost(&self, colony: &Colony) -> f64 {
        self.settings
            .objective
            .cost(colony, self.frame, self.settings.palette)
    }

    fn neighbor<R: Rng>(&self, colony: &Colony, rng: &mut R) -> Colony {
        if colony.is_empty() {
            return colony.clone();
        }

        let moves = self.settings.moves;
        if self.settings.model.supports_structural() && moves.split + moves.combine > 0.0 {
            let r = rng.random_range(0.0..1.0);
            let structural = if r < moves.split {
                self.try_split(colony, rng)
            } else if r < moves.split + moves.combine {
                self.try_combine(colony, rng)
            } else {
                None
            };
            if let Some(next) = structural {
                return next;
            }
        }

        let i = rng.random_range(0..colony.len());
        let cell = self.settings.model.perturb(&colony.node(i).cell, rng, 1.0);
        let mut next = colony.clone();
        next.replace(i, cell);
        next
    }
}

/// Outcome of one job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub colony: Colony,
    pub cost: f64,
    pub job_id: usize,
}

/// Runs one annealing job.
///
/// Returns [`Error::Interrupted`] when `cancel` is raised mid-run.
pub fn run_job(
    settings: &WorkerSettings,
    frame: &Frame,
    seed: &Colony,
    schedule: TemperatureSchedule,
    job_id: usize,
    rng_seed: u64,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<JobResult> {
    let config = SaConfig::new(schedule)
        .with_cooling(settings.cooling)
        .with_max_iterations(settings.budget(seed.len()))
        .with_seed(rng_seed);
    let problem = settings.problem(frame);
    let result = SaRunner::run_with_cancel(&problem, seed.clone(), &config, cancel)?;
    if result.cancelled {
        return Err(Error::Interrupted);
    }

    tracing::debug!(
        job_id,
        cost = result.best_cost,
        iterations = result.iterations,
        accepted = result.accepted_moves,
        "job finished"
    );
    Ok(JobResult {
        colony: result.best,
        cost: result.best_cost,
        job_id,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cell::{Bacillus, BacillusModel, Cell};
    use crate::colony::CellNode;
    use crate::render::render;

    pub(crate) fn settings() -> WorkerSettings {
        WorkerSettings {
            model: CellModel::Bacillus(BacillusModel {
                max_speed: 1.0,
                max_spin: 0.1,
                min_growth: -0.5,
                max_growth: 0.5,
                min_width: 3.0,
                max_width: 6.0,
                min_length: 4.0,
                max_length: 30.0,
            }),
            objective: Objective::Pixel,
            palette: Palette::default(),
            moves: MoveProbabilities::default(),
            iterations_per_cell: 400,
            cooling: CoolingSchedule::Geometric,
        }
    }

    pub(crate) fn colony(cells: &[(&str, f64, f64)]) -> Colony {
        let mut colony = Colony::new();
        for &(name, x, y) in cells {
            colony
                .add(CellNode::new(Cell::Bacillus(Bacillus::new(
                    name, x, y, 4.0, 14.0, 0.0,
                ))))
                .unwrap();
        }
        colony
    }

    pub(crate) fn target(cells: &[(&str, f64, f64)]) -> Frame {
        render(&colony(cells), 40, 24, Palette::default())
    }

    #[test]
    fn test_job_is_deterministic() {
        let settings = settings();
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a", 18.0, 11.0)]);
        let schedule = TemperatureSchedule::new(20.0, 0.05);

        let a = run_job(&settings, &frame, &seed, schedule, 0, 77, None).unwrap();
        let b = run_job(&settings, &frame, &seed, schedule, 0, 77, None).unwrap();
        assert_eq!(a.cost, b.cost);
        assert_eq!(a.colony.to_cells(), b.colony.to_cells());
    }

    #[test]
    fn test_job_improves_fit() {
        let settings = settings();
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a", 17.0, 10.0)]);
        let initial = settings.problem(&frame).cost(&seed);

        let schedule = TemperatureSchedule::new(10.0, 0.01);
        let result = run_job(&settings, &frame, &seed, schedule, 3, 5, None).unwrap();
        assert!(result.cost < initial, "{} !< {initial}", result.cost);
        assert_eq!(result.job_id, 3);
        assert!(result.cost >= 0.0);
    }

    #[test]
    fn test_job_does_not_touch_seed() {
        let settings = settings();
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a", 17.0, 10.0)]);
        let before = seed.to_cells();
        run_job(&settings, &frame, &seed, TemperatureSchedule::new(5.0, 0.1), 0, 1, None)
            .unwrap();
        assert_eq!(seed.to_cells(), before);
    }

    #[test]
    fn test_cancelled_job_is_interrupted() {
        let settings = settings();
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a", 17.0, 10.0)]);
        let cancel = Arc::new(AtomicBool::new(true));
        let result = run_job(
            &settings,
            &frame,
            &seed,
            TemperatureSchedule::new(5.0, 0.1),
            0,
            1,
            Some(cancel),
        );
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[test]
    fn test_neighbor_may_split() {
        let mut settings = settings();
        settings.moves = MoveProbabilities {
            split: 1.0,
            combine: 0.0,
        };
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a", 20.0, 12.0)]);
        let problem = settings.problem(&frame);
        let mut rng = crate::rng::create_rng(0);
        let next = problem.neighbor(&seed, &mut rng);
        assert_eq!(next.len(), 2);
        assert!(next.get("a0").is_some() && next.get("a1").is_some());
    }

    #[test]
    fn test_neighbor_may_combine() {
        let mut settings = settings();
        settings.moves = MoveProbabilities {
            split: 0.0,
            combine: 1.0,
        };
        let frame = target(&[("a", 20.0, 12.0)]);
        let seed = colony(&[("a0", 14.0, 12.0), ("a1", 26.0, 12.0)]);
        let problem = settings.problem(&frame);
        let mut rng = crate::rng::create_rng(0);
        let next = problem.neighbor(&seed, &mut rng);
        assert_eq!(next.len(), 1);
        assert!(next.get("a").is_some());
    }

    #[test]
    fn test_out_of_bounds_cell_rejected() {
        let settings = settings();
        assert!(settings.check_colony(&colony(&[("a", 17.0, 12.0)])).is_ok());

        let mut seed = colony(&[("a", 17.0, 12.0)]);
        // narrower than min_width
        seed.add(CellNode::new(Cell::Bacillus(Bacillus::new(
            "thin", 10.0, 12.0, 2.5, 14.0, 0.0,
        ))))
        .unwrap();
        let err = settings.check_colony(&seed).unwrap_err();
        assert!(matches!(err, Error::Input(ref m) if m.contains("thin")));
    }

    #[test]
    fn test_from_config_reads_cooling() {
        let text = r#"{"global.cellType": "bacilli", "global.pixelsPerMicron": 1,
            "global.framesPerSecond": 1, "simulation.cooling": "linear",
            "bacilli.maxSpeed": 1, "bacilli.maxSpin": 0.1,
            "bacilli.minGrowth": -0.5, "bacilli.maxGrowth": 0.5,
            "bacilli.minWidth": 3, "bacilli.maxWidth": 6,
            "bacilli.minLength": 4, "bacilli.maxLength": 30}"#;
        let config = RunConfig::from_json_str(text).unwrap();
        let settings = WorkerSettings::from_config(&config, Objective::Pixel).unwrap();
        assert_eq!(settings.cooling, CoolingSchedule::Linear);
    }

    #[test]
    fn test_move_probabilities_validated() {
        let text = r#"{"global.cellType": "bacilli", "global.pixelsPerMicron": 1,
            "global.framesPerSecond": 1, "prob.split": 0.7, "prob.combine": 0.6}"#;
        let config = RunConfig::from_json_str(text).unwrap();
        assert!(MoveProbabilities::from_config(&config).is_err());
    }
}
