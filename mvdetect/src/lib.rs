//! # Motion Vector Detection Engine
//!
//! This library decides, frame by frame, whether a camera sees real motion, based on the
//! per-macroblock motion vectors a hardware video encoder produces alongside its output. Every
//! macroblock is compared against a sensitivity heatmap, and the number of exceeding macroblocks
//! goes through an adaptive noise filter before movement is reported.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use mvdetect::prelude::v1::*;
//!
//! let engine = mvdetect::init(EngineConfig::new(1920, 1080), |intensity, event| {
//!     println!("{:?} ({})", event, intensity);
//! })?;
//!
//! let (rows, cols) = engine.grid_dims();
//! engine.submit(MotionVectorFrame::new(rows, cols));
//! engine.shutdown().ok();
//! # Ok::<(), mvdetect::Error>(())
//! ```

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod filter;
pub mod frame;
pub mod heatmap;
pub mod mailbox;
pub mod visualizer;

pub use engine::{current_frame, init};
pub use error::{Error, Result};

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            config::{EngineConfig, SensitivitySource},
            detection::{HeatmapMotionDetection, MotionEvent},
            engine::{current_frame, FrameSink, MotionEngine},
            error::{Error, Result},
            filter::NoiseFilter,
            frame::{MotionVector, MotionVectorFrame},
            heatmap::Heatmap,
            visualizer::DebugVisualizer,
        };
    }
}
