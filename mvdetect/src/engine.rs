//! # Detection engine
//!
//! The engine owns a single background thread that takes frames out of a drop-oldest mailbox and
//! runs them through [`HeatmapMotionDetection`]. Producers hand frames over through
//! [`MotionEngine::submit`] or a [`FrameSink`], which never wait on detection progress.

use crate::config::EngineConfig;
use crate::detection::{EventCallback, HeatmapMotionDetection, MotionEvent};
use crate::error::{Error, Result};
use crate::frame::MotionVectorFrame;
use crate::mailbox::Mailbox;
use log::*;
use std::cell::Cell;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread::{Builder, JoinHandle};

/// Name of the detection thread.
pub const WORKER_NAME: &str = "motion-detect";

thread_local! {
    static CURRENT_FRAME: Cell<Option<u64>> = Cell::new(None);
}

/// Submission index of the frame being processed on this thread.
///
/// Frames are numbered from 0 in the order they are submitted to an engine. Inside the event
/// callback this is the frame that raised the event. Outside the detection thread it is `None`.
pub fn current_frame() -> Option<u64> {
    CURRENT_FRAME.with(Cell::get)
}

#[derive(Default)]
struct Shared {
    mailbox: Mailbox<MotionVectorFrame>,
    received: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn ingest(&self, mut frame: MotionVectorFrame) {
        frame.set_seq(self.received.fetch_add(1, Ordering::Relaxed));

        if self.mailbox.put(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Cloneable frame submission handle for producer threads.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<Shared>,
}

impl FrameSink {
    /// Hand a frame over to the detection thread.
    ///
    /// A frame that is still waiting to be processed gets released and replaced. After the engine
    /// has shut down the frame is released immediately.
    pub fn submit(&self, frame: MotionVectorFrame) {
        self.shared.ingest(frame)
    }
}

/// Running motion detection engine.
pub struct MotionEngine {
    shared: Arc<Shared>,
    dims: (usize, usize),
    handle: Option<JoinHandle<()>>,
}

/// Start a motion detection engine.
///
/// Loads the heatmap and spawns the detection thread. Nothing is left running on failure.
///
/// # Arguments
///
/// * `config` - engine configuration.
/// * `callback` - receiver of movement events, called from the detection thread.
pub fn init(
    config: EngineConfig,
    callback: impl FnMut(u32, MotionEvent) + Send + 'static,
) -> Result<MotionEngine> {
    MotionEngine::new(config, Box::new(callback))
}

impl MotionEngine {
    pub fn new(config: EngineConfig, callback: EventCallback) -> Result<Self> {
        let detector = HeatmapMotionDetection::new(&config, callback)?;
        let heatmap = detector.heatmap();

        info!(
            "Motion grid {}x{} (padding included), sensitivity {}, threshold {}, window {}",
            heatmap.cols(),
            heatmap.rows(),
            config.sensitivity,
            config.threshold,
            config.window_size
        );

        if let Some(dump) = &config.debug_dump {
            info!("PNG filename: {}", dump);
        }

        Self::spawn(detector)
    }

    /// Start the detection thread around an existing detector.
    pub fn spawn(mut detector: HeatmapMotionDetection) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let dims = (detector.heatmap().rows(), detector.heatmap().cols());

        let handle = {
            let shared = shared.clone();
            Builder::new()
                .name(WORKER_NAME.into())
                .spawn(move || {
                    while let Some(frame) = shared.mailbox.take() {
                        CURRENT_FRAME.with(|c| c.set(Some(frame.seq())));
                        let report = detector.detect_motion(&frame);
                        CURRENT_FRAME.with(|c| c.set(None));

                        let counter = match report {
                            Some(_) => &shared.processed,
                            None => &shared.skipped,
                        };
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("Detection worker stopped");
                })
                .map_err(Error::Spawn)?
        };

        Ok(Self {
            shared,
            dims,
            handle: Some(handle),
        })
    }

    /// Hand a frame over to the detection thread.
    ///
    /// See [`FrameSink::submit`].
    pub fn submit(&self, frame: MotionVectorFrame) {
        self.shared.ingest(frame)
    }

    /// Get a submission handle that can be moved to the producer thread.
    pub fn sink(&self) -> FrameSink {
        FrameSink {
            shared: self.shared.clone(),
        }
    }

    /// Macroblock grid dimensions as `(rows, cols)`, padding included.
    pub fn grid_dims(&self) -> (usize, usize) {
        self.dims
    }

    /// Number of frames submitted so far.
    pub fn received_frames(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Number of frames fully run through detection.
    pub fn processed_frames(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Number of frames rejected by the worker for not matching the grid size.
    pub fn skipped_frames(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    /// Number of frames replaced in the mailbox before being processed.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Whether the detection thread is still alive.
    ///
    /// Turns false after shutdown, or once the event callback has panicked.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Whether the worker is done with everything submitted so far.
    ///
    /// A worker that has exited has nothing left to do, so this is also true once it is no
    /// longer running. [`MotionEngine::shutdown`] reports whether it exited by panicking.
    pub fn is_idle(&self) -> bool {
        self.received_frames()
            == self.processed_frames() + self.skipped_frames() + self.dropped_frames()
            || !self.is_running()
    }

    /// Stop the detection thread and wait for it to exit.
    ///
    /// A frame that is in progress is finished, a pending one is released unprocessed. Returns the
    /// thread's join result, which is an error if the event callback panicked.
    pub fn shutdown(mut self) -> std::thread::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> std::thread::Result<()> {
        if self.shared.mailbox.close().is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }

        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for MotionEngine {
    fn drop(&mut self) {
        if self.stop().is_err() {
            error!("Detection worker panicked");
        }
    }
}
