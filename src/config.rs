//! Run configuration.
//!
//! Two layers feed an optimization run:
//!
//! - [`RunConfig`]: the JSON configuration file (cell type, optics, shape
//!   bounds). Keys are flat dotted strings such as `global.cellType`.
//! - [`OptimizerParams`]: the already-parsed caller parameters (frame range,
//!   parallelism, aggregation, temperature mode).

use crate::aggregate::Strategy;
use crate::cell::CellType;
use crate::error::{Error, Result};
use crate::render::Objective;
use crate::sa::CoolingSchedule;
use crate::temperature::TemperatureMode;
use serde_json::{Map, Value};
use std::path::Path;

/// Parsed configuration file.
#[derive(Debug, Clone)]
pub struct RunConfig {
    values: Map<String, Value>,
    cell_type: CellType,
    pixels_per_micron: f64,
    frames_per_second: f64,
}

impl RunConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Parses configuration text. Whole-line `//` comments are ignored.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let stripped: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let value: Value = serde_json::from_str(&stripped)?;
        let Value::Object(values) = value else {
            return Err(Error::config("must be a dictionary"));
        };

        let cell_type = match values.get("global.cellType") {
            Some(Value::String(s)) => s.parse::<CellType>()?,
            Some(_) => return Err(Error::config("\"global.cellType\" must be a string")),
            None => return Err(Error::config("missing \"global.cellType\"")),
        };

        let mut config = Self {
            values,
            cell_type,
            pixels_per_micron: 0.0,
            frames_per_second: 0.0,
        };
        config.pixels_per_micron = config.require_f64("global.pixelsPerMicron")?;
        config.frames_per_second = config.require_f64("global.framesPerSecond")?;
        if config.pixels_per_micron <= 0.0 {
            return Err(Error::config("\"global.pixelsPerMicron\" must be positive"));
        }
        if config.frames_per_second <= 0.0 {
            return Err(Error::config("\"global.framesPerSecond\" must be positive"));
        }
        Ok(config)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn pixels_per_micron(&self) -> f64 {
        self.pixels_per_micron
    }

    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    /// Returns a numeric key, or `None` when absent.
    ///
    /// Present keys with a non-numeric value are an error.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| Error::config(format!("\"{key}\" must be a number"))),
        }
    }

    /// Returns a numeric key, failing when it is missing.
    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.get_f64(key)?
            .ok_or_else(|| Error::config(format!("missing \"{key}\"")))
    }

    /// Returns a numeric key or a default.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.get_f64(key)?.unwrap_or(default))
    }

    /// Annealing iterations granted per cell in one job.
    pub fn iterations_per_cell(&self) -> Result<usize> {
        let n = self.f64_or("simulation.iterationsPerCell", 1000.0)?;
        if n < 1.0 {
            return Err(Error::config(
                "\"simulation.iterationsPerCell\" must be at least 1",
            ));
        }
        Ok(n as usize)
    }

    /// Cooling curve of every job, `simulation.cooling` (default geometric).
    pub fn cooling(&self) -> Result<CoolingSchedule> {
        match self.values.get("simulation.cooling") {
            None => Ok(CoolingSchedule::default()),
            Some(Value::String(s)) => s.parse(),
            Some(_) => Err(Error::config("\"simulation.cooling\" must be a string")),
        }
    }

    /// Weight of the inter-frame continuity penalty in global mode.
    pub fn continuity_weight(&self) -> Result<f64> {
        let w = self.f64_or("global.continuityWeight", 1.0)?;
        if w < 0.0 {
            return Err(Error::config(
                "\"global.continuityWeight\" must be non-negative",
            ));
        }
        Ok(w)
    }
}

/// Caller-supplied parameters of an optimization run.
///
/// # Examples
///
/// ```
/// use cellanneal::config::OptimizerParams;
/// use cellanneal::aggregate::Strategy;
///
/// let params = OptimizerParams::default()
///     .with_workers(4)
///     .with_jobs(8)
///     .with_keep(2)
///     .with_strategy(Strategy::WorstWins)
///     .with_manual_temperature(10.0, 0.01);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct OptimizerParams {
    /// First frame index of the input pattern.
    pub frame_first: i64,

    /// Last frame index, or negative to run until the first missing file.
    pub frame_last: i64,

    /// Objective used to compare renderings with frames.
    pub objective: Objective,

    /// Concurrent execution slots. `None` uses the number of CPUs.
    pub workers: Option<usize>,

    /// Jobs per frame. `None` defaults to `workers` on a local pool.
    pub jobs: Option<usize>,

    /// How many of the lowest-cost results enter the strategy.
    pub keep: usize,

    /// Selection rule over the kept results.
    pub strategy: Strategy,

    /// Comma-separated `host:port` list of cluster workers. Empty = local.
    pub cluster: String,

    /// Run every job on the calling thread.
    pub no_parallel: bool,

    /// Optimize the whole frame sequence jointly.
    pub global_optimization: bool,

    /// Calibrate temperatures automatically.
    pub auto_temp: bool,

    /// Manual starting temperature.
    pub start_temp: Option<f64>,

    /// Manual ending temperature.
    pub end_temp: Option<f64>,

    /// Run seed. `None` draws one at random.
    pub seed: Option<u64>,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            frame_first: 0,
            frame_last: -1,
            objective: Objective::Pixel,
            workers: None,
            jobs: None,
            keep: 1,
            strategy: Strategy::BestWins,
            cluster: String::new(),
            no_parallel: false,
            global_optimization: false,
            auto_temp: true,
            start_temp: None,
            end_temp: None,
            seed: None,
        }
    }
}

impl OptimizerParams {
    pub fn with_frames(mut self, first: i64, last: i64) -> Self {
        self.frame_first = first;
        self.frame_last = last;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    pub fn with_jobs(mut self, n: usize) -> Self {
        self.jobs = Some(n);
        self
    }

    pub fn with_keep(mut self, k: usize) -> Self {
        self.keep = k;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    pub fn with_no_parallel(mut self, flag: bool) -> Self {
        self.no_parallel = flag;
        self
    }

    pub fn with_global_optimization(mut self, flag: bool) -> Self {
        self.global_optimization = flag;
        self
    }

    /// Disables auto mode and fixes both temperatures.
    pub fn with_manual_temperature(mut self, start: f64, end: f64) -> Self {
        self.auto_temp = false;
        self.start_temp = Some(start);
        self.end_temp = Some(end);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Effective number of execution slots.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Effective number of jobs per frame.
    pub fn resolved_jobs(&self) -> Result<usize> {
        match self.jobs {
            Some(j) => Ok(j),
            None if !self.cluster.trim().is_empty() => {
                Err(Error::config("jobs is required for non-local clusters"))
            }
            None => Ok(self.resolved_workers()),
        }
    }

    /// Resolves the temperature mode, rejecting auto mode mixed with
    /// manual temperatures.
    pub fn temperature_mode(&self) -> Result<TemperatureMode> {
        TemperatureMode::resolve(self.auto_temp, self.start_temp, self.end_temp)
    }

    /// Validates the parameters. Runs before any frame is processed.
    pub fn validate(&self) -> Result<()> {
        if self.resolved_workers() == 0 {
            return Err(Error::config("workers must be at least 1"));
        }
        let jobs = self.resolved_jobs()?;
        if jobs == 0 {
            return Err(Error::config("jobs must be at least 1"));
        }
        if self.keep == 0 {
            return Err(Error::config("keep must be at least 1"));
        }
        if self.keep > jobs {
            return Err(Error::config(format!(
                "keep ({}) must be equal or less than jobs ({jobs})",
                self.keep
            )));
        }
        self.temperature_mode()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        // optics
        "global.cellType": "Bacilli",
        "global.pixelsPerMicron": 12,
        "global.framesPerSecond": 1
    }"#;

    #[test]
    fn test_minimal_config() {
        let config = RunConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.cell_type(), CellType::Bacillus);
        assert!((config.pixels_per_micron() - 12.0).abs() < 1e-12);
        assert_eq!(config.iterations_per_cell().unwrap(), 1000);
        assert!((config.continuity_weight().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(config.cooling().unwrap(), CoolingSchedule::Geometric);
    }

    #[test]
    fn test_cooling_key() {
        let text = r#"{"global.cellType": "bacilli", "global.pixelsPerMicron": 1,
            "global.framesPerSecond": 1, "simulation.cooling": "linear"}"#;
        let config = RunConfig::from_json_str(text).unwrap();
        assert_eq!(config.cooling().unwrap(), CoolingSchedule::Linear);

        let bad = text.replace("\"linear\"", "3");
        let config = RunConfig::from_json_str(&bad).unwrap();
        assert!(matches!(config.cooling(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_required_key() {
        let err = RunConfig::from_json_str(r#"{"global.cellType": "bacilli"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("pixelsPerMicron")));
    }

    #[test]
    fn test_unsupported_cell_type() {
        let text = r#"{"global.cellType": "cocci", "global.pixelsPerMicron": 1, "global.framesPerSecond": 1}"#;
        assert!(matches!(
            RunConfig::from_json_str(text),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_non_object_config() {
        assert!(matches!(
            RunConfig::from_json_str("[1, 2]"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_params_valid() {
        let params = OptimizerParams::default().with_workers(2);
        assert!(params.validate().is_ok());
        assert_eq!(params.resolved_jobs().unwrap(), 2);
    }

    #[test]
    fn test_keep_greater_than_jobs() {
        let params = OptimizerParams::default().with_jobs(2).with_keep(3);
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_keep() {
        let params = OptimizerParams::default().with_jobs(2).with_keep(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_cluster_requires_jobs() {
        let params = OptimizerParams::default().with_cluster("10.0.0.2:7070");
        assert!(matches!(params.validate(), Err(Error::Config(_))));
        let params = params.with_jobs(16);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_auto_with_manual_start_rejected() {
        let mut params = OptimizerParams::default().with_jobs(1);
        params.start_temp = Some(5.0);
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }
}
