//! Synthetic rendering and fit objectives.
//!
//! A colony is rasterised by testing each pixel centre against the signed
//! distance of every cell whose bounding box covers it. Objectives compare
//! the rendering with a real frame and return a non-negative cost.

use crate::colony::Colony;
use crate::config::RunConfig;
use crate::error::Result;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Intensities used for synthetic images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub background: f32,
    pub cell: f32,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: 0.0,
            cell: 1.0,
        }
    }
}

impl Palette {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            background: config
                .f64_or("simulation.background.color", defaults.background as f64)?
                as f32,
            cell: config.f64_or("simulation.cell.color", defaults.cell as f64)? as f32,
        })
    }
}

/// Objective comparing a rendering with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    /// Sum of absolute intensity differences.
    #[default]
    Pixel,

    /// Intensity differences weighted by `1 + d`, where `d` is the distance
    /// from the pixel to the nearest cell boundary.
    Distance,
}

impl Objective {
    /// Cost of `colony` against `frame`. Always `>= 0`.
    pub fn cost(&self, colony: &Colony, frame: &Frame, palette: Palette) -> f64 {
        let synthetic = render(colony, frame.width(), frame.height(), palette);
        match self {
            Objective::Pixel => synthetic
                .pixels()
                .iter()
                .zip(frame.pixels())
                .map(|(s, r)| (s - r).abs() as f64)
                .sum(),
            Objective::Distance => {
                let mut total = 0.0;
                for y in 0..frame.height() {
                    for x in 0..frame.width() {
                        let diff = (synthetic.get(x, y) - frame.get(x, y)).abs() as f64;
                        if diff == 0.0 {
                            continue;
                        }
                        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                        let d = colony
                            .cells()
                            .map(|c| c.signed_distance(px, py).abs())
                            .fold(f64::INFINITY, f64::min);
                        let d = if d.is_finite() { d } else { 0.0 };
                        total += diff * (1.0 + d);
                    }
                }
                total
            }
        }
    }
}

/// Rasterises a colony into a `width x height` frame.
pub fn render(colony: &Colony, width: usize, height: usize, palette: Palette) -> Frame {
    let mut pixels = vec![palette.background; width * height];
    for cell in colony.cells() {
        let (x0, y0, x1, y1) = cell.bounding_box();
        let cx0 = x0.floor().max(0.0) as usize;
        let cy0 = y0.floor().max(0.0) as usize;
        let cx1 = (x1.ceil().max(0.0) as usize).min(width);
        let cy1 = (y1.ceil().max(0.0) as usize).min(height);
        for y in cy0..cy1 {
            for x in cx0..cx1 {
                if cell.signed_distance(x as f64 + 0.5, y as f64 + 0.5) <= 0.0 {
                    pixels[y * width + x] = palette.cell;
                }
            }
        }
    }
    Frame::from_parts(width, height, pixels)
}
