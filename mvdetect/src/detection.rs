//! Motion detection module

use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::{FilterOutput, NoiseFilter};
use crate::frame::MotionVectorFrame;
use crate::heatmap::Heatmap;
use crate::visualizer::DebugVisualizer;
use log::*;

/// Kind of event reported to the recording state machine.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MotionEvent {
    Movement,
}

/// Receiver of motion events.
///
/// Invoked synchronously from the detection thread with the filtered intensity. It must return
/// promptly, and any panic is not caught.
pub type EventCallback = Box<dyn FnMut(u32, MotionEvent) + Send>;

/// Result of processing a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Number of macroblocks above their sensitivity.
    pub exceed_count: usize,
    pub filter: FilterOutput,
    /// Whether the event callback was invoked.
    pub triggered: bool,
}

/// Heatmap based motion detector.
///
/// Counts the macroblocks whose motion exceeds the heatmap, runs the count through the noise
/// filter, and reports movement once the filtered value reaches the threshold.
pub struct HeatmapMotionDetection {
    heatmap: Heatmap,
    filter: NoiseFilter,
    threshold: u32,
    visualizer: Option<DebugVisualizer>,
    dumps: u64,
    callback: EventCallback,
}

impl HeatmapMotionDetection {
    /// Create a detector from configuration, loading the heatmap.
    pub fn new(config: &EngineConfig, callback: EventCallback) -> Result<Self> {
        config.validate()?;

        let heatmap = Heatmap::build(config.width, config.height, &config.sensitivity)?;

        Self::with_heatmap(config, heatmap, callback)
    }

    /// Create a detector with an already built heatmap.
    pub fn with_heatmap(
        config: &EngineConfig,
        heatmap: Heatmap,
        callback: EventCallback,
    ) -> Result<Self> {
        config.validate()?;

        let filter = NoiseFilter::new(config.threshold, heatmap.size(), config.window_size)?;

        Ok(Self {
            heatmap,
            filter,
            threshold: config.threshold,
            visualizer: config.debug_dump.as_deref().map(DebugVisualizer::new),
            dumps: 0,
            callback,
        })
    }

    pub fn heatmap(&self) -> &Heatmap {
        &self.heatmap
    }

    pub fn filter(&self) -> &NoiseFilter {
        &self.filter
    }

    /// Process a single frame.
    ///
    /// Returns `None` if the frame does not match the grid size, in which case nothing is
    /// updated.
    pub fn detect_motion(&mut self, frame: &MotionVectorFrame) -> Option<FrameReport> {
        let (rows, cols) = (self.heatmap.rows(), self.heatmap.cols());

        if frame.len() != self.heatmap.size() {
            warn!(
                "Skipping frame with {} vectors, expected {}x{}",
                frame.len(),
                cols,
                rows
            );
            return None;
        }

        let exceed_count = self.heatmap.exceed_count(frame.as_slice());

        if let Some(vis) = &mut self.visualizer {
            match vis.dump(frame.as_slice(), rows, cols, self.dumps) {
                Ok(path) => trace!("Dumped motion map to {}", path.display()),
                Err(e) => warn!("Failed to dump motion map: {}", e),
            }
            self.dumps += 1;
        }

        let filter = self.filter.step(exceed_count);

        debug!(
            "{:4}({:4} -{:3}) / {} ({})",
            filter.filtered,
            exceed_count,
            filter.noise_floor,
            self.threshold,
            self.heatmap.size()
        );

        let triggered = filter.filtered >= self.threshold;

        if triggered {
            (self.callback)(filter.filtered, MotionEvent::Movement);
        }

        Some(FrameReport {
            exceed_count,
            filter,
            triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensitivitySource;
    use crate::frame::MotionVector;
    use std::sync::{Arc, Mutex};

    type Events = Arc<Mutex<Vec<(u32, MotionEvent)>>>;

    fn detector(threshold: u32) -> (HeatmapMotionDetection, Events) {
        let events = Events::default();

        let config = EngineConfig {
            threshold,
            sensitivity: SensitivitySource::Uniform(10),
            ..EngineConfig::new(64, 64)
        };

        let cb_events = events.clone();
        let detector = HeatmapMotionDetection::new(
            &config,
            Box::new(move |v, e| cb_events.lock().unwrap().push((v, e))),
        )
        .unwrap();

        (detector, events)
    }

    fn frame_with_motion(blocks: usize) -> MotionVectorFrame {
        let mut frame = MotionVectorFrame::new(4, 5);
        for i in 0..blocks {
            frame.set_motion(5, i % 4, i / 4, MotionVector::new(20, 0));
        }
        frame
    }

    #[test]
    fn counts_single_block() {
        let (mut detector, events) = detector(1);

        for _ in 0..12 {
            let report = detector.detect_motion(&frame_with_motion(0)).unwrap();
            assert_eq!(report.exceed_count, 0);
            assert!(!report.triggered);
        }

        assert_eq!(detector.filter().noise_floor(), 0);

        let report = detector.detect_motion(&frame_with_motion(1)).unwrap();
        assert_eq!(report.exceed_count, 1);
        // A lone block is averaged over 12 frames and stays below threshold.
        assert_eq!(report.filter.filtered, 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn sustained_motion_triggers() {
        let (mut detector, events) = detector(1);

        for _ in 0..12 {
            detector.detect_motion(&frame_with_motion(0));
        }

        // 5 of 20 blocks is exactly at the saturation limit, and above the 4x floor cap.
        let triggered = (0..5)
            .map(|_| detector.detect_motion(&frame_with_motion(5)).unwrap())
            .map(|r| r.triggered)
            .collect::<Vec<_>>();

        assert_eq!(triggered, [false, false, false, false, true]);
        assert_eq!(*events.lock().unwrap(), [(1, MotionEvent::Movement)]);
    }

    #[test]
    fn whole_frame_motion_is_clamped() {
        let (mut detector, events) = detector(1);

        for _ in 0..40 {
            let report = detector.detect_motion(&frame_with_motion(16)).unwrap();
            assert_eq!(report.exceed_count, 16);
            assert_eq!(report.filter.clamped, 1);
            assert!(!report.triggered);
        }

        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn skips_mismatched_frame() {
        let (mut detector, _) = detector(1);
        assert!(detector
            .detect_motion(&MotionVectorFrame::new(4, 4))
            .is_none());
        assert_eq!(detector.filter().cursor(), 0);
    }

    #[test]
    fn dump_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            debug_dump: Some(
                dir.path()
                    .join("missing")
                    .join("{seq}.png")
                    .to_string_lossy()
                    .into_owned(),
            ),
            ..EngineConfig::new(64, 64)
        };

        let mut detector = HeatmapMotionDetection::new(&config, Box::new(|_, _| {})).unwrap();
        assert!(detector.detect_motion(&frame_with_motion(1)).is_some());
    }

    #[test]
    fn dumps_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            debug_dump: Some(dir.path().join("{seq}.png").to_string_lossy().into_owned()),
            ..EngineConfig::new(64, 64)
        };

        let mut detector = HeatmapMotionDetection::new(&config, Box::new(|_, _| {})).unwrap();

        for _ in 0..3 {
            detector.detect_motion(&frame_with_motion(2));
        }

        for i in 0..3 {
            assert!(dir.path().join(format!("{}.png", i)).exists());
        }
    }
}
