//! Simulated Annealing (SA) engine.
//!
//! A single-solution trajectory search that accepts worsening moves with the
//! Metropolis probability `exp(-delta / T)`, where the temperature `T`
//! decays from a start to an end value over a fixed iteration budget.
//!
//! The engine is generic over [`SaProblem`]. Per-frame colony fitting and
//! whole-sequence trajectory fitting are two implementations of it.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Metropolis et al. (1953), "Equation of State Calculations by Fast
//!   Computing Machines"

mod config;
mod runner;
mod types;

pub use config::{CoolingSchedule, SaConfig};
pub use runner::{Annealer, AnnealState, SaResult, SaRunner};
pub use types::SaProblem;
