//! SA configuration and cooling schedules.

use crate::error::{Error, Result};
use crate::temperature::TemperatureSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Shape of the temperature curve between the start and end temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoolingSchedule {
    /// `T_k = T_start * (T_end / T_start)^(k / (n - 1))`.
    #[default]
    Geometric,

    /// `T_k = T_start + (T_end - T_start) * k / (n - 1)`.
    Linear,
}

impl CoolingSchedule {
    /// Temperature at iteration `k` of an `n`-iteration run.
    ///
    /// `T_0` is the start temperature and `T_{n-1}` the end temperature.
    pub fn temperature_at(&self, schedule: &TemperatureSchedule, k: usize, n: usize) -> f64 {
        if n <= 1 {
            return schedule.start;
        }
        let frac = (k.min(n - 1)) as f64 / (n - 1) as f64;
        match self {
            CoolingSchedule::Geometric => {
                schedule.start * (schedule.end / schedule.start).powf(frac)
            }
            CoolingSchedule::Linear => schedule.start + (schedule.end - schedule.start) * frac,
        }
    }
}

impl FromStr for CoolingSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geometric" => Ok(CoolingSchedule::Geometric),
            "linear" => Ok(CoolingSchedule::Linear),
            _ => Err(Error::config(format!(
                "unknown cooling schedule \"{s}\" (expected geometric or linear)"
            ))),
        }
    }
}

/// Configuration for one annealing run.
///
/// # Examples
///
/// ```
/// use cellanneal::sa::{CoolingSchedule, SaConfig};
/// use cellanneal::temperature::TemperatureSchedule;
///
/// let config = SaConfig::new(TemperatureSchedule::new(10.0, 0.01))
///     .with_cooling(CoolingSchedule::Linear)
///     .with_max_iterations(5000)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaConfig {
    /// Start and end temperatures.
    pub schedule: TemperatureSchedule,

    /// Cooling curve.
    pub cooling: CoolingSchedule,

    /// Iteration budget.
    pub max_iterations: usize,

    /// Random seed for reproducibility. `None` draws one.
    pub seed: Option<u64>,
}

impl SaConfig {
    pub fn new(schedule: TemperatureSchedule) -> Self {
        Self {
            schedule,
            cooling: CoolingSchedule::default(),
            max_iterations: 1000,
            seed: None,
        }
    }

    pub fn with_cooling(mut self, cooling: CoolingSchedule) -> Self {
        self.cooling = cooling;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Temperature at iteration `k`.
    pub fn temperature_at(&self, k: usize) -> f64 {
        self.cooling
            .temperature_at(&self.schedule, k, self.max_iterations)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        Ok(())
    }
}
