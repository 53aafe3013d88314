//! # Noise adaptive exceed-count filter
//!
//! Raw exceed-counts are noisy: the encoder produces spurious vectors on sensor noise, lighting
//! changes and compression artifacts. The filter smooths the counts over the last
//! [`SHORT_WINDOW`] frames and subtracts an adaptive noise floor estimated over a longer ring
//! buffer of past samples.

use crate::config::SHORT_WINDOW;
use crate::error::{Error, Result};

/// Single filtering step breakdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterOutput {
    /// Sample after the saturation clamp.
    pub clamped: u32,
    /// Noise floor estimate.
    pub noise_floor: u32,
    /// Mean of the most recent samples.
    pub average: u32,
    /// `average - noise_floor`, or 0.
    pub filtered: u32,
}

/// Stateful filter over per-frame exceed-counts.
#[derive(Clone, Debug)]
pub struct NoiseFilter {
    window: Vec<u32>,
    sum: u64,
    cursor: usize,
    threshold: u32,
    saturation: usize,
}

impl NoiseFilter {
    /// Create a new filter with zeroed history.
    ///
    /// # Arguments
    ///
    /// * `threshold` - exceed-count that constitutes motion.
    /// * `blocks` - number of macroblocks in a frame, including padding.
    /// * `window_size` - ring buffer capacity, at least [`SHORT_WINDOW`].
    pub fn new(threshold: u32, blocks: usize, window_size: usize) -> Result<Self> {
        if window_size < SHORT_WINDOW {
            return Err(Error::config(format!(
                "window size must be at least {}, got {}",
                SHORT_WINDOW, window_size
            )));
        }

        let mut window = vec![];
        window.try_reserve_exact(window_size)?;
        window.resize(window_size, 0);

        Ok(Self {
            window,
            sum: 0,
            cursor: 0,
            threshold,
            saturation: blocks / 4,
        })
    }

    /// Feed the next raw exceed-count and get the filtered value.
    pub fn filter(&mut self, raw: usize) -> u32 {
        self.step(raw).filtered
    }

    /// Feed the next raw exceed-count and get all intermediate values.
    pub fn step(&mut self, raw: usize) -> FilterOutput {
        let len = self.window.len();

        // More than a quarter of the frame moving is an encoder or lighting glitch, not motion.
        let clamped = if raw > self.saturation {
            self.threshold
        } else {
            raw as u32
        };

        // Large values must not drag the noise floor up with them.
        let cap = self.threshold.saturating_mul(4);
        self.sum += clamped.min(cap) as u64;
        self.sum -= self.window[self.cursor].min(cap) as u64;
        let noise_floor = (self.sum / len as u64) as u32;

        self.window[self.cursor] = clamped;

        let head: u64 = (0..SHORT_WINDOW)
            .map(|i| self.window[(self.cursor + len - i) % len] as u64)
            .sum();
        let average = (head / SHORT_WINDOW as u64) as u32;

        self.cursor = (self.cursor + 1) % len;

        FilterOutput {
            clamped,
            noise_floor,
            average,
            filtered: average.saturating_sub(noise_floor),
        }
    }

    /// Current ring buffer write position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Current noise floor estimate.
    pub fn noise_floor(&self) -> u32 {
        (self.sum / self.window.len() as u64) as u32
    }
}
