//! Fits parametric cell models to time-lapse microscopy with distributed
//! simulated annealing.
//!
//! For every frame a set of independent annealing jobs perturbs a copy of
//! the previous frame's colony against the image; the results are reduced
//! to one colony that seeds the next frame:
//!
//! - **Cell model** ([`cell`]): closed set of shape families with bounds,
//!   perturbation, split and combine.
//! - **Rendering** ([`render`]): synthetic images and the pixel and
//!   distance objectives.
//! - **Annealing engine** ([`sa`]): generic state machine over any
//!   [`sa::SaProblem`] with geometric or linear cooling.
//! - **Temperatures** ([`temperature`]): manual schedules or calibration
//!   from sampled cost deltas.
//! - **Dispatch** ([`dispatch`]): runs the jobs of a frame sequentially, on
//!   a local thread pool, or on remote `cellanneal serve` workers.
//! - **Aggregation** ([`aggregate`]): keep-K filter and selection strategy.
//! - **Global mode** ([`global`]): anneals the whole frame sequence with a
//!   continuity penalty.
//!
//! [`pipeline::run`] drives a complete run from files on disk.

pub mod aggregate;
pub mod cell;
pub mod colony;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod frames;
pub mod global;
pub mod lineage;
pub mod pipeline;
pub mod render;
pub mod rng;
pub mod sa;
pub mod temperature;
pub mod worker;

pub use error::{Error, Result};
