//! # Per-macroblock sensitivity heatmap
//!
//! The heatmap holds a squared sensitivity threshold for every macroblock. Squaring ahead of time
//! lets detection compare against `dx^2 + dy^2` directly, without taking a square root per
//! macroblock.

use crate::config::{grid_dims, SensitivitySource};
use crate::error::{Error, Result};
use crate::frame::MotionVector;
use image::{GrayImage, ImageFormat};
use log::*;
use std::path::Path;

/// Threshold of the padding column. Nothing can exceed it.
pub const PADDING_THRESHOLD: u16 = u16::MAX;

/// Fixed size grid of squared sensitivity thresholds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heatmap {
    map: Vec<u16>,
    rows: usize,
    cols: usize,
}

impl Heatmap {
    /// Build a heatmap for given frame resolution.
    ///
    /// # Arguments
    ///
    /// * `width` - frame width in pixels.
    /// * `height` - frame height in pixels.
    /// * `source` - where to take sensitivity values from.
    pub fn build(width: usize, height: usize, source: &SensitivitySource) -> Result<Self> {
        match source {
            SensitivitySource::Uniform(sens) => Self::uniform(width, height, *sens),
            SensitivitySource::Image(path) => Self::from_image(width, height, path),
        }
    }

    /// Build a heatmap with equal sensitivity everywhere.
    pub fn uniform(width: usize, height: usize, sens: u32) -> Result<Self> {
        let sens = sens.saturating_mul(sens).min(u16::MAX as u32) as u16;

        let mut heatmap = Self::alloc(width, height)?;
        heatmap.fill_rows(|_, _| sens);

        Ok(heatmap)
    }

    /// Build a heatmap from an 8-bit greyscale PNG image.
    ///
    /// The image needs at least one pixel per non-padding macroblock. Anything beyond that is
    /// ignored.
    pub fn from_image(width: usize, height: usize, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading mapfile {}", path.display());

        let bytes = std::fs::read(path)?;

        if image::guess_format(&bytes).ok() != Some(ImageFormat::Png) {
            return Err(Error::format(format!(
                "{} is not a PNG image",
                path.display()
            )));
        }

        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.into_luma8();

        Self::from_luma(width, height, &img)
    }

    /// Build a heatmap from an already decoded greyscale image.
    pub fn from_luma(width: usize, height: usize, img: &GrayImage) -> Result<Self> {
        let mut heatmap = Self::alloc(width, height)?;

        let (img_w, img_h) = (img.width() as usize, img.height() as usize);

        if img_h < heatmap.rows || img_w < heatmap.cols - 1 {
            return Err(Error::format(format!(
                "insufficient dimensions: map is {}x{}, need at least {}x{}",
                img_w,
                img_h,
                heatmap.cols - 1,
                heatmap.rows
            )));
        }

        heatmap.fill_rows(|x, y| {
            let px = img.get_pixel(x as u32, y as u32).0[0] as u16;
            px * px
        });

        Ok(heatmap)
    }

    /// Allocate an all-zero grid, reporting allocation failure instead of aborting.
    fn alloc(width: usize, height: usize) -> Result<Self> {
        let (rows, cols) = grid_dims(width, height);

        let mut map = vec![];
        map.try_reserve_exact(rows * cols)?;
        map.resize(rows * cols, 0);

        Ok(Self { map, rows, cols })
    }

    /// Fill every non-padding cell with `f(x, y)` and force padding cells to the maximum.
    fn fill_rows(&mut self, f: impl Fn(usize, usize) -> u16) {
        let cols = self.cols;

        for (y, row) in self.map.chunks_exact_mut(cols).enumerate() {
            let (cells, padding) = row.split_at_mut(cols - 1);
            for (x, cell) in cells.iter_mut().enumerate() {
                *cell = f(x, y);
            }
            padding[0] = PADDING_THRESHOLD;
        }
    }

    /// Get width and height of the grid, including the padding column.
    pub fn dim(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of macroblocks, including padding.
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Get the squared threshold at coordinates.
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.map[y * self.cols + x]
    }

    /// Get the thresholds in row-major order.
    pub fn as_slice(&self) -> &[u16] {
        &self.map
    }

    /// Count macroblocks whose squared motion is strictly above their threshold.
    pub fn exceed_count(&self, vectors: &[MotionVector]) -> usize {
        self.map
            .iter()
            .zip(vectors)
            .filter(|&(&threshold, v)| (threshold as u32) < v.magnitude_squared())
            .count()
    }
}
