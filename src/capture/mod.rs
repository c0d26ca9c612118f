//! Frame Capture Layer
//!
//! Frame sources supply the current raw frame and its native dimensions.
//! Acquisition is read-only: sources never see what the pipeline does with
//! a frame.

pub mod frame;
pub mod sequence;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use frame::CapturedFrame;

pub use sequence::ImageSequenceSource;

/// Errors raised while starting acquisition
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The configured source does not exist
    #[error("frame source not found: {0}")]
    NotFound(PathBuf),
    /// The source exists but holds no usable frames
    #[error("no decodable frames in {0}")]
    NoFrames(PathBuf),
    /// No source was configured
    #[error("no frame source configured")]
    NotConfigured,
    /// Reading the source failed
    #[error("failed to read frame source: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame source configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Image file or directory of frames
    pub source: PathBuf,
    /// Replay rate in frames per second
    pub fps: u32,
    /// Start over after the last frame
    pub loop_frames: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            fps: 30,
            loop_frames: true,
        }
    }
}

impl CaptureConfig {
    /// Build from the persisted capture settings
    pub fn from_settings(settings: &crate::config::CaptureSettings) -> Result<Self, CaptureError> {
        let source = settings.source.clone().ok_or(CaptureError::NotConfigured)?;
        Ok(Self {
            source,
            fps: settings.fps.max(1),
            loop_frames: settings.loop_frames,
        })
    }
}

/// A live source of frames
///
/// `start`/`stop` bracket acquisition. While stopped, `dimensions` and
/// `current_frame` return `None`.
pub trait FrameSource: Send {
    /// Begin acquisition
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Release acquisition resources; safe to call when not started
    fn stop(&mut self);

    /// Whether frames are currently being delivered
    fn is_streaming(&self) -> bool;

    /// Native (width, height) of the current frame, None until known
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The current frame
    fn current_frame(&self) -> Option<Arc<CapturedFrame>>;
}

/// Serves a single in-memory frame
#[cfg(test)]
pub struct StillFrameSource {
    frame: Arc<CapturedFrame>,
    streaming: bool,
}

#[cfg(test)]
impl StillFrameSource {
    /// Create a source that always returns `frame`
    pub fn new(frame: CapturedFrame) -> Self {
        Self {
            frame: Arc::new(frame),
            streaming: false,
        }
    }
}

#[cfg(test)]
impl FrameSource for StillFrameSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        if !self.streaming {
            return None;
        }
        match self.frame.dimensions() {
            (0, _) | (_, 0) => None,
            dims => Some(dims),
        }
    }

    fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.streaming.then(|| self.frame.clone())
    }
}
