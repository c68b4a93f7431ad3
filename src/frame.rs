//! Grayscale frames decoded from microscope images.

use crate::error::{Error, Result};
use std::path::Path;

/// A grayscale image with intensities in `[0, 1]`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl Frame {
    /// Wraps a pixel buffer.
    ///
    /// Fails when `pixels.len() != width * height`.
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(Error::input(format!(
                "frame buffer has {} pixels, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub(crate) fn from_parts(width: usize, height: usize, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decodes an image file and converts it to normalized grayscale.
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path)?.to_luma32f();
        let (w, h) = img.dimensions();
        Self::new(w as usize, h as usize, img.into_raw())
    }

    /// Writes the frame as an 8-bit grayscale PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let bytes: Vec<u8> = self
            .pixels
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let buffer = image::GrayImage::from_raw(self.width as u32, self.height as u32, bytes)
            .ok_or_else(|| Error::input("frame buffer does not match its dimensions"))?;
        buffer.save(path)?;
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mismatched_buffer() {
        assert!(Frame::new(3, 3, vec![0.0; 8]).is_err());
        assert!(Frame::new(3, 3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn test_png_round_trip_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut pixels = vec![0.0; 12];
        pixels[5] = 1.0;
        let frame = Frame::new(4, 3, pixels).unwrap();
        frame.save_png(&path).unwrap();

        let loaded = Frame::open(&path).unwrap();
        assert_eq!(loaded.width(), 4);
        assert_eq!(loaded.height(), 3);
        assert!((loaded.get(1, 1) - 1.0).abs() < 1e-3);
        assert!(loaded.get(0, 0).abs() < 1e-3);
    }
}
