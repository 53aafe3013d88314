//! # Engine configuration

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Size of a single encoder macroblock, in pixels.
pub const MACROBLOCK_SIZE: usize = 16;

/// Number of most recent samples averaged by the noise filter.
///
/// The filter's ring buffer must be able to hold at least this many samples.
pub const SHORT_WINDOW: usize = 12;

/// Placeholder replaced with the frame sequence number in diagnostic dump paths.
pub const SEQ_PLACEHOLDER: &str = "{seq}";

/// Where per-macroblock sensitivity comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SensitivitySource {
    /// Same sensitivity for every macroblock.
    Uniform(u32),
    /// 8-bit greyscale image, one pixel per macroblock.
    Image(PathBuf),
}

impl Default for SensitivitySource {
    fn default() -> Self {
        Self::Uniform(0)
    }
}

impl fmt::Display for SensitivitySource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Uniform(sens) => write!(f, "uniform {}", sens),
            Self::Image(path) => write!(f, "map {}", path.display()),
        }
    }
}

/// Immutable engine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Filtered exceed-count at which movement is reported.
    pub threshold: u32,
    /// Capacity of the noise filter's ring buffer.
    pub window_size: usize,
    pub sensitivity: SensitivitySource,
    /// Path template for per-frame diagnostic images.
    ///
    /// Every occurrence of `{seq}` is replaced with the sequence number of the dump. Without the
    /// placeholder, the same file gets overwritten on every frame.
    pub debug_dump: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            threshold: 1,
            window_size: SHORT_WINDOW,
            sensitivity: Default::default(),
            debug_dump: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for given frame resolution.
    ///
    /// # Arguments
    ///
    /// * `width` - frame width in pixels.
    /// * `height` - frame height in pixels.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Get the macroblock grid dimensions as `(rows, cols)`.
    ///
    /// `cols` includes the single padding column the encoder emits at the end of each row.
    pub fn grid_dims(&self) -> (usize, usize) {
        grid_dims(self.width, self.height)
    }

    /// Check that the configuration can be used to start an engine.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if self.window_size < SHORT_WINDOW {
            return Err(Error::config(format!(
                "window size must be at least {}, got {}",
                SHORT_WINDOW, self.window_size
            )));
        }

        Ok(())
    }
}

/// Compute `(rows, cols)` of the macroblock grid for a frame resolution.
pub fn grid_dims(width: usize, height: usize) -> (usize, usize) {
    let rows = (height + MACROBLOCK_SIZE - 1) / MACROBLOCK_SIZE;
    let cols = (width + MACROBLOCK_SIZE - 1) / MACROBLOCK_SIZE + 1;
    (rows, cols)
}
