//! Cell models.
//!
//! Cell shapes form a closed set selected once from `global.cellType`:
//!
//! - [`Cell`]: the geometry of one cell, one variant per shape family
//! - [`CellModel`]: the bounds and perturbation kernel of a shape family
//! - [`CellType`]: the configuration-level selector
//!
//! Adding a shape family means adding a variant to each enum; the annealing
//! engine, dispatcher and aggregator never look inside.

mod bacillus;

pub use bacillus::{Bacillus, BacillusModel};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported shape families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Bacillus,
}

impl FromStr for CellType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bacilli" | "bacillus" => Ok(CellType::Bacillus),
            other => Err(Error::config(format!("unsupported cell type \"{other}\""))),
        }
    }
}

impl CellType {
    /// Geometry columns of the tabular formats, after `name`.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            CellType::Bacillus => &["x", "y", "width", "length", "rotation"],
        }
    }

    /// Builds a cell from its name and geometry values in [`columns`] order.
    ///
    /// [`columns`]: CellType::columns
    pub fn build(&self, name: &str, values: &[f64]) -> Result<Cell> {
        match self {
            CellType::Bacillus => match *values {
                [x, y, width, length, rotation] => Ok(Cell::Bacillus(Bacillus::new(
                    name, x, y, width, length, rotation,
                ))),
                _ => Err(Error::input(format!(
                    "cell \"{name}\" needs 5 geometry values, got {}",
                    values.len()
                ))),
            },
        }
    }
}

/// Geometry of a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cell {
    Bacillus(Bacillus),
}

impl Cell {
    pub fn name(&self) -> &str {
        match self {
            Cell::Bacillus(b) => &b.name,
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            Cell::Bacillus(_) => CellType::Bacillus,
        }
    }

    /// Signed distance to the cell boundary, negative inside.
    pub fn signed_distance(&self, x: f64, y: f64) -> f64 {
        match self {
            Cell::Bacillus(b) => b.signed_distance(x, y),
        }
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)`.
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        match self {
            Cell::Bacillus(b) => b.bounding_box(),
        }
    }

    /// Geometry values in [`CellType::columns`] order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Cell::Bacillus(b) => b.params().to_vec(),
        }
    }

    /// Adds `delta` (in [`values`](Cell::values) order) to the geometry.
    pub fn displaced(&self, delta: &[f64]) -> Cell {
        match self {
            Cell::Bacillus(b) => {
                let mut p = b.params();
                for (v, d) in p.iter_mut().zip(delta) {
                    *v += d;
                }
                Cell::Bacillus(b.with_params(p))
            }
        }
    }
}

/// Bounds and perturbation kernel of the configured shape family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellModel {
    Bacillus(BacillusModel),
}

impl CellModel {
    /// Validates the shape-specific keys of the configuration.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        match config.cell_type() {
            CellType::Bacillus => Ok(CellModel::Bacillus(BacillusModel::from_config(config)?)),
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            CellModel::Bacillus(_) => CellType::Bacillus,
        }
    }

    /// Whether split and combine proposals are available.
    pub fn supports_structural(&self) -> bool {
        match self {
            CellModel::Bacillus(_) => true,
        }
    }

    pub fn is_valid(&self, cell: &Cell) -> bool {
        match (self, cell) {
            (CellModel::Bacillus(m), Cell::Bacillus(b)) => m.is_valid(b),
        }
    }

    /// Returns a randomly displaced copy of `cell`. The result is always
    /// valid; when no valid displacement is found the cell is returned
    /// unchanged.
    pub fn perturb<R: Rng>(&self, cell: &Cell, rng: &mut R, magnitude: f64) -> Cell {
        match (self, cell) {
            (CellModel::Bacillus(m), Cell::Bacillus(b)) => {
                Cell::Bacillus(m.perturb(b, rng, magnitude))
            }
        }
    }

    pub fn split(&self, cell: &Cell) -> Option<(Cell, Cell)> {
        match (self, cell) {
            (CellModel::Bacillus(m), Cell::Bacillus(b)) => m
                .split(b)
                .map(|(x, y)| (Cell::Bacillus(x), Cell::Bacillus(y))),
        }
    }

    pub fn combine(&self, a: &Cell, b: &Cell) -> Option<Cell> {
        match (self, a, b) {
            (CellModel::Bacillus(m), Cell::Bacillus(x), Cell::Bacillus(y)) => {
                m.combine(x, y).map(Cell::Bacillus)
            }
        }
    }

    /// Normalised squared jump between two observations of one cell.
    pub fn continuity(&self, a: &Cell, b: &Cell) -> f64 {
        match (self, a, b) {
            (CellModel::Bacillus(m), Cell::Bacillus(x), Cell::Bacillus(y)) => m.continuity(x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> RunConfig {
        let text = format!(
            r#"{{
                "global.cellType": "bacilli",
                "global.pixelsPerMicron": 10,
                "global.framesPerSecond": 2
                {extra}
            }}"#
        );
        RunConfig::from_json_str(&text).unwrap()
    }

    const BOUNDS: &str = r#",
        "bacilli.maxSpeed": 1, "bacilli.maxSpin": 0.5,
        "bacilli.minGrowth": 0, "bacilli.maxGrowth": 0.2,
        "bacilli.minWidth": 0.5, "bacilli.maxWidth": 1.5,
        "bacilli.minLength": 1, "bacilli.maxLength": 6"#;

    #[test]
    fn test_cell_type_parse() {
        assert_eq!("Bacilli".parse::<CellType>().unwrap(), CellType::Bacillus);
        assert_eq!(" bacillus ".parse::<CellType>().unwrap(), CellType::Bacillus);
        assert!("coccus".parse::<CellType>().is_err());
    }

    #[test]
    fn test_model_converts_units() {
        let model = CellModel::from_config(&config(BOUNDS)).unwrap();
        let CellModel::Bacillus(m) = model;
        assert!((m.max_speed - 5.0).abs() < 1e-12);
        assert!((m.max_spin - 0.25).abs() < 1e-12);
        assert!((m.min_width - 5.0).abs() < 1e-12);
        assert!((m.max_length - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_model_requires_shape_keys() {
        assert!(matches!(
            CellModel::from_config(&config("")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_build_from_values() {
        let cell = CellType::Bacillus
            .build("a", &[1.0, 2.0, 3.0, 4.0, 0.5])
            .unwrap();
        assert_eq!(cell.name(), "a");
        assert_eq!(cell.values(), vec![1.0, 2.0, 3.0, 4.0, 0.5]);
        assert!(CellType::Bacillus.build("a", &[1.0]).is_err());
    }

    #[test]
    fn test_serde_tagged() {
        let cell = Cell::Bacillus(Bacillus::new("a", 1.0, 2.0, 3.0, 4.0, 0.0));
        let json = serde_json::to_string(&cell).unwrap();
        assert!(json.contains("\"type\":\"bacillus\""));
        let back: Cell = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cell);
    }
}
