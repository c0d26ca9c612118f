//! Image sequence replay
//!
//! Stands in for a camera by replaying still images (a single file or a
//! directory sorted by file name) at a fixed frame rate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::frame::CapturedFrame;
use super::{CaptureConfig, CaptureError, FrameSource};

/// Replays decoded image files as a live frame stream
pub struct ImageSequenceSource {
    config: CaptureConfig,
    frames: Vec<Arc<CapturedFrame>>,
    started_at: Option<Instant>,
}

impl ImageSequenceSource {
    /// Create a source; nothing is read until `start`
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            frames: Vec::new(),
            started_at: None,
        }
    }

    fn frame_index(&self, started_at: Instant) -> usize {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        let idx = (elapsed_ms * self.config.fps.max(1) as u64 / 1000) as usize;
        if self.config.loop_frames {
            idx % self.frames.len()
        } else {
            idx.min(self.frames.len() - 1)
        }
    }
}

/// Collect image paths from a file or directory, sorted by name
fn collect_image_paths(source: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    if !source.exists() {
        return Err(CaptureError::NotFound(source.to_path_buf()));
    }

    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.started_at.is_some() {
            return Ok(());
        }

        let paths = collect_image_paths(&self.config.source)?;
        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match image::open(path) {
                Ok(img) => frames.push(Arc::new(CapturedFrame::from_image(img))),
                Err(e) => warn!("Skipping undecodable frame {:?}: {}", path, e),
            }
        }

        if frames.is_empty() {
            return Err(CaptureError::NoFrames(self.config.source.clone()));
        }

        info!(
            "Replaying {} frame(s) from {:?} at {} fps",
            frames.len(),
            self.config.source,
            self.config.fps
        );
        self.frames = frames;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        if self.started_at.take().is_some() {
            debug!("Frame replay stopped");
        }
        self.frames.clear();
    }

    fn is_streaming(&self) -> bool {
        self.started_at.is_some()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        let frame = self.current_frame()?;
        match frame.dimensions() {
            (0, _) | (_, 0) => None,
            dims => Some(dims),
        }
    }

    fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
        let started_at = self.started_at?;
        if self.frames.is_empty() {
            return None;
        }
        Some(self.frames[self.frame_index(started_at)].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn write_frame(dir: &Path, name: &str, w: u32, h: u32) {
        let img = RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_missing_source_fails_to_start() {
        let mut source = ImageSequenceSource::new(CaptureConfig {
            source: PathBuf::from("/nonexistent/frames"),
            ..Default::default()
        });
        assert!(matches!(source.start(), Err(CaptureError::NotFound(_))));
        assert!(!source.is_streaming());
    }

    #[test]
    fn test_empty_directory_has_no_frames() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = ImageSequenceSource::new(CaptureConfig {
            source: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert!(matches!(source.start(), Err(CaptureError::NoFrames(_))));
    }

    #[test]
    fn test_directory_replay() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "b.png", 40, 30);
        write_frame(dir.path(), "a.png", 40, 30);

        let mut source = ImageSequenceSource::new(CaptureConfig {
            source: dir.path().to_path_buf(),
            fps: 10,
            loop_frames: true,
        });
        assert!(source.dimensions().is_none());

        source.start().unwrap();
        assert_eq!(source.frames.len(), 2);
        assert_eq!(source.dimensions(), Some((40, 30)));
        assert!(source.current_frame().is_some());

        source.stop();
        assert!(source.current_frame().is_none());
        source.stop();
    }

    #[test]
    fn test_single_file_source() {
        let dir = tempdir().unwrap();
        write_frame(dir.path(), "frame.png", 16, 8);

        let mut source = ImageSequenceSource::new(CaptureConfig {
            source: dir.path().join("frame.png"),
            fps: 30,
            loop_frames: false,
        });
        source.start().unwrap();
        assert_eq!(source.dimensions(), Some((16, 8)));
    }
}
