//! Rod-shaped (bacillus) cells.
//!
//! A bacillus is a capsule: a segment of length `length - width` along
//! `rotation`, inflated by `width / 2`. All quantities are in pixels and
//! radians.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Attempts made by [`BacillusModel::perturb`] before giving up.
const MAX_PERTURB_ATTEMPTS: usize = 32;

/// Geometry of one bacillus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bacillus {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub length: f64,
    pub rotation: f64,
}

impl Bacillus {
    pub fn new(
        name: impl Into<String>,
        x: f64,
        y: f64,
        width: f64,
        length: f64,
        rotation: f64,
    ) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            length,
            rotation,
        }
    }

    /// Half-length of the inner segment (excluding caps).
    fn half_axis(&self) -> f64 {
        ((self.length - self.width) / 2.0).max(0.0)
    }

    fn direction(&self) -> (f64, f64) {
        (self.rotation.cos(), self.rotation.sin())
    }

    /// Signed distance from `(px, py)` to the capsule boundary.
    /// Negative inside.
    pub fn signed_distance(&self, px: f64, py: f64) -> f64 {
        let (ux, uy) = self.direction();
        let (dx, dy) = (px - self.x, py - self.y);
        let h = self.half_axis();
        let along = (dx * ux + dy * uy).clamp(-h, h);
        let (cx, cy) = (dx - along * ux, dy - along * uy);
        (cx * cx + cy * cy).sqrt() - self.width / 2.0
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)`.
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let (ux, uy) = self.direction();
        let h = self.half_axis();
        let r = self.width / 2.0;
        let ex = (h * ux).abs() + r;
        let ey = (h * uy).abs() + r;
        (self.x - ex, self.y - ey, self.x + ex, self.y + ey)
    }

    /// Geometry in column order `x, y, width, length, rotation`.
    pub fn params(&self) -> [f64; 5] {
        [self.x, self.y, self.width, self.length, self.rotation]
    }

    pub fn with_params(&self, p: [f64; 5]) -> Self {
        Self {
            name: self.name.clone(),
            x: p[0],
            y: p[1],
            width: p[2],
            length: p[3],
            rotation: p[4],
        }
    }
}

/// Shape bounds and per-frame step sizes for bacilli.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacillusModel {
    /// Maximum displacement per frame, pixels.
    pub max_speed: f64,
    /// Maximum rotation per frame, radians.
    pub max_spin: f64,
    /// Growth bounds per frame, pixels.
    pub min_growth: f64,
    pub max_growth: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_length: f64,
    pub max_length: f64,
}

impl BacillusModel {
    /// Reads the `bacilli.*` keys, converting micrometres and seconds into
    /// pixels and frames.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let ppm = config.pixels_per_micron();
        let fps = config.frames_per_second();
        let model = Self {
            max_speed: config.require_f64("bacilli.maxSpeed")? * ppm / fps,
            max_spin: config.require_f64("bacilli.maxSpin")? / fps,
            min_growth: config.require_f64("bacilli.minGrowth")? * ppm / fps,
            max_growth: config.require_f64("bacilli.maxGrowth")? * ppm / fps,
            min_width: config.require_f64("bacilli.minWidth")? * ppm,
            max_width: config.require_f64("bacilli.maxWidth")? * ppm,
            min_length: config.require_f64("bacilli.minLength")? * ppm,
            max_length: config.require_f64("bacilli.maxLength")? * ppm,
        };
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<()> {
        if self.max_speed < 0.0 || self.max_spin < 0.0 {
            return Err(Error::config(
                "bacilli.maxSpeed and bacilli.maxSpin must be non-negative",
            ));
        }
        if self.min_growth > self.max_growth {
            return Err(Error::config("bacilli.minGrowth exceeds bacilli.maxGrowth"));
        }
        if self.min_width <= 0.0 || self.min_width > self.max_width {
            return Err(Error::config(
                "bacilli width bounds must satisfy 0 < minWidth <= maxWidth",
            ));
        }
        if self.min_length <= 0.0 || self.min_length > self.max_length {
            return Err(Error::config(
                "bacilli length bounds must satisfy 0 < minLength <= maxLength",
            ));
        }
        Ok(())
    }

    /// Whether the geometry lies inside the shape bounds.
    pub fn is_valid(&self, cell: &Bacillus) -> bool {
        let finite = cell.params().iter().all(|v| v.is_finite());
        finite
            && cell.width > 0.0
            && cell.length > 0.0
            && (self.min_width..=self.max_width).contains(&cell.width)
            && (self.min_length..=self.max_length).contains(&cell.length)
    }

    /// Step size of each parameter, in `params()` order.
    pub fn steps(&self) -> [f64; 5] {
        [
            self.max_speed.max(0.5),
            self.max_speed.max(0.5),
            (0.1 * (self.max_width - self.min_width)).max(0.05),
            self.min_growth.abs().max(self.max_growth.abs()).max(0.1),
            self.max_spin.max(0.01),
        ]
    }

    /// Displaces one randomly chosen parameter.
    pub fn perturb<R: Rng>(&self, cell: &Bacillus, rng: &mut R, magnitude: f64) -> Bacillus {
        let steps = self.steps();
        for _ in 0..MAX_PERTURB_ATTEMPTS {
            let i = rng.random_range(0..steps.len());
            let mut p = cell.params();
            p[i] += rng.random_range(-1.0..1.0) * steps[i] * magnitude;
            let candidate = cell.with_params(p);
            if self.is_valid(&candidate) {
                return candidate;
            }
        }
        cell.clone()
    }

    /// Divides a cell into two halves along its axis.
    pub fn split(&self, cell: &Bacillus) -> Option<(Bacillus, Bacillus)> {
        let half = cell.length / 2.0;
        let (ux, uy) = cell.direction();
        let offset = half / 2.0;
        let make = |suffix: &str, sign: f64| {
            Bacillus::new(
                format!("{}{suffix}", cell.name),
                cell.x + sign * offset * ux,
                cell.y + sign * offset * uy,
                cell.width,
                half,
                cell.rotation,
            )
        };
        let (a, b) = (make("0", -1.0), make("1", 1.0));
        (self.is_valid(&a) && self.is_valid(&b)).then_some((a, b))
    }

    /// Merges two sibling cells back into their parent.
    ///
    /// Siblings share every character of their name but the last.
    pub fn combine(&self, a: &Bacillus, b: &Bacillus) -> Option<Bacillus> {
        let prefix = sibling_prefix(&a.name, &b.name)?;
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let gap = (dx * dx + dy * dy).sqrt();
        let rotation = if gap > f64::EPSILON {
            dy.atan2(dx)
        } else {
            a.rotation
        };
        let merged = Bacillus::new(
            prefix,
            (a.x + b.x) / 2.0,
            (a.y + b.y) / 2.0,
            (a.width + b.width) / 2.0,
            gap + (a.length + b.length) / 2.0,
            rotation,
        );
        self.is_valid(&merged).then_some(merged)
    }

    /// Squared parameter jumps between two observations of the same cell,
    /// normalised by the step sizes.
    pub fn continuity(&self, a: &Bacillus, b: &Bacillus) -> f64 {
        let steps = self.steps();
        a.params()
            .iter()
            .zip(b.params())
            .zip(steps)
            .map(|((u, v), s)| ((v - u) / s).powi(2))
            .sum()
    }
}

fn sibling_prefix<'a>(a: &'a str, b: &str) -> Option<&'a str> {
    if a.len() < 2 || a.len() != b.len() || a == b {
        return None;
    }
    let cut = a.char_indices().last()?.0;
    let cut_b = b.char_indices().last()?.0;
    (cut == cut_b && a[..cut] == b[..cut_b]).then(|| &a[..cut])
}
