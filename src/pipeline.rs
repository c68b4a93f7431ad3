//! Top-level run: load inputs, resolve the schedule, process frames, write
//! the lineage.
//!
//! Greedy mode processes frames strictly in order. Each frame is seeded from
//! the colony committed for the previous one (the initial colony for the
//! first), fanned out as J jobs, and reduced by the aggregator. Global mode
//! anneals the whole trajectory at once and commits it frame by frame.

use crate::aggregate::aggregate;
use crate::colony::{Colony, LineageFrames};
use crate::config::{OptimizerParams, RunConfig};
use crate::dispatch::{FrameInput, JobDispatcher};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::frames::discover_frames;
use crate::global::{self, Trajectory, TrajectoryProblem};
use crate::lineage::{load_colony, LineageWriter};
use crate::render::render;
use crate::rng::derive_seed;
use crate::temperature::{
    auto_temp_schedule, TemperatureMode, TemperatureSchedule, CALIBRATION_SAMPLES,
};
use crate::worker::WorkerSettings;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// RNG stream reserved for temperature calibration.
const CALIBRATION_STREAM: usize = usize::MAX;

/// File locations of a run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// printf-style frame pattern, e.g. `frames/img%03d.png`.
    pub input: String,
    /// Directory receiving `lineage.csv`.
    pub output: PathBuf,
    pub config: PathBuf,
    pub initial: PathBuf,
    /// Directory receiving the synthetic rendering of each committed frame.
    pub debug: Option<PathBuf>,
}

impl RunPaths {
    pub fn lineage_file(&self) -> PathBuf {
        self.output.join("lineage.csv")
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames: usize,
    pub rows: usize,
    pub schedule: TemperatureSchedule,
    pub seed: u64,
    pub elapsed: Duration,
}

/// Runs an optimization end to end.
///
/// Configuration and input problems are reported before the lineage file is
/// created. On [`Error::Interrupted`] the lineage file holds every frame
/// committed so far.
pub fn run(
    paths: &RunPaths,
    params: &OptimizerParams,
    cancel: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let started = Instant::now();

    params.validate()?;
    let mode = params.temperature_mode()?;
    let config = RunConfig::load(&paths.config)?;
    let settings = WorkerSettings::from_config(&config, params.objective)?;
    let continuity_weight = config.continuity_weight()?;
    let initial = load_colony(&paths.initial, config.cell_type())?;
    settings.check_colony(&initial)?;
    let files = discover_frames(&paths.input, params.frame_first, params.frame_last)?;

    std::fs::create_dir_all(&paths.output).map_err(|e| Error::io(&paths.output, e))?;
    if let Some(debug) = &paths.debug {
        std::fs::create_dir_all(debug).map_err(|e| Error::io(debug, e))?;
    }
    let mut writer = LineageWriter::create(&paths.lineage_file(), config.cell_type())?;

    let seed = params.seed.unwrap_or_else(rand::random);
    tracing::info!(
        seed,
        frames = files.len(),
        cells = initial.len(),
        mode = if params.global_optimization { "global" } else { "greedy" },
        "run started"
    );

    let mut lineage = LineageFrames::new();
    lineage.flatten(initial);

    let run = Run {
        paths,
        params,
        settings: &settings,
        files: &files,
        seed,
        cancel,
    };
    let schedule = if params.global_optimization {
        run.global(mode, continuity_weight, &mut lineage, &mut writer)?
    } else {
        run.greedy(mode, &mut lineage, &mut writer)?
    };

    let summary = RunSummary {
        frames: lineage.len() - 1,
        rows: writer.rows(),
        schedule,
        seed,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        frames = summary.frames,
        rows = summary.rows,
        seconds = summary.elapsed.as_secs_f64(),
        "run finished"
    );
    Ok(summary)
}

struct Run<'a> {
    paths: &'a RunPaths,
    params: &'a OptimizerParams,
    settings: &'a WorkerSettings,
    files: &'a [PathBuf],
    seed: u64,
    cancel: Arc<AtomicBool>,
}

impl Run<'_> {
    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    fn resolve(
        &self,
        mode: TemperatureMode,
        calibrate: impl FnOnce(u64) -> Result<TemperatureSchedule>,
    ) -> Result<TemperatureSchedule> {
        let schedule = match mode {
            TemperatureMode::Manual(schedule) => schedule,
            TemperatureMode::Auto => calibrate(derive_seed(self.seed, CALIBRATION_STREAM, 0))?,
        };
        tracing::info!(
            start = schedule.start,
            end = schedule.end,
            auto = matches!(mode, TemperatureMode::Auto),
            "temperature schedule resolved"
        );
        Ok(schedule)
    }

    fn greedy(
        &self,
        mode: TemperatureMode,
        lineage: &mut LineageFrames,
        writer: &mut LineageWriter,
    ) -> Result<TemperatureSchedule> {
        let schedule = self.resolve(mode, |rng_seed| {
            let first = Frame::open(&self.files[0])?;
            Ok(auto_temp_schedule(
                &self.settings.problem(&first),
                &lineage.forward(),
                CALIBRATION_SAMPLES,
                rng_seed,
            ))
        })?;

        let dispatcher = JobDispatcher::new(
            self.params,
            self.settings.clone(),
            self.seed,
            Arc::clone(&self.cancel),
        )?;

        for (index, path) in self.files.iter().enumerate() {
            self.check_cancel()?;
            let frame = FrameInput::new(index, Some(path.clone()), Frame::open(path)?);
            let seed = lineage.forward();

            let results = dispatcher.run_frame(&frame, &seed, schedule)?;
            let survivors = results.len();
            let selected = aggregate(results, self.params.keep, self.params.strategy, index)?;
            tracing::info!(
                frame = index,
                file = %path.display(),
                cost = selected.cost,
                job = selected.job_id,
                survivors,
                cells = selected.colony.len(),
                "frame committed"
            );
            self.commit(index, path, &frame.image, selected.colony, lineage, writer)?;
        }
        Ok(schedule)
    }

    fn global(
        &self,
        mode: TemperatureMode,
        continuity_weight: f64,
        lineage: &mut LineageFrames,
        writer: &mut LineageWriter,
    ) -> Result<TemperatureSchedule> {
        let images = self
            .files
            .iter()
            .map(|path| Frame::open(path).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let problem = TrajectoryProblem::new(&images, self.settings, continuity_weight);
        let initial = Trajectory::replicate(&lineage.forward(), images.len());

        let schedule = self.resolve(mode, |rng_seed| {
            Ok(auto_temp_schedule(&problem, &initial, CALIBRATION_SAMPLES, rng_seed))
        })?;
        self.check_cancel()?;

        let (trajectory, cost) = global::optimize(
            &problem,
            initial,
            schedule,
            derive_seed(self.seed, 0, 0),
            Some(Arc::clone(&self.cancel)),
        )?;
        tracing::info!(cost, "trajectory committed");

        let frames = trajectory.into_frames().into_iter().zip(self.files);
        for (index, (colony, path)) in frames.enumerate() {
            let colony = Colony::relinked(colony.to_cells(), &lineage.forward())?;
            self.commit(index, path, &images[index], colony, lineage, writer)?;
        }
        Ok(schedule)
    }

    fn commit(
        &self,
        index: usize,
        path: &Path,
        image: &Frame,
        colony: Colony,
        lineage: &mut LineageFrames,
        writer: &mut LineageWriter,
    ) -> Result<()> {
        if let Some(debug) = &self.paths.debug {
            let palette = self.settings.palette;
            let synthetic = render(&colony, image.width(), image.height(), palette);
            synthetic.save_png(&debug.join(format!("synthetic{index:03}.png")))?;
        }
        let snapshot = lineage.flatten(colony);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        writer.write_frame(&name, snapshot.cells())
    }
}
