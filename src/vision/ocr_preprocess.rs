//! Image conditioning for OCR
//!
//! Turns a field's region of a frame into a two-level raster: crop and scale
//! by direct pixel copy, average the channels into a luminance, stretch the
//! contrast around mid-gray, threshold, and optionally invert. Binarization
//! removes lighting gradients and print noise; inversion serves displays that
//! draw light digits on a dark background.

use image::{GrayImage, Luma};
use thiserror::Error;
use tracing::trace;

use crate::capture::frame::CapturedFrame;
use crate::config::ConditioningConfig;
use crate::vision::roi::Rect;

/// Two-level raster handed to the recognition engine
pub type BinaryRaster = GrayImage;

/// Level written for pixels above the threshold
pub const LEVEL_HIGH: u8 = 255;
/// Level written for pixels at or below the threshold
pub const LEVEL_LOW: u8 = 0;

/// Conditioning failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// The rectangle does not overlap the frame
    #[error("region {0:?} lies outside the {1}x{2} frame")]
    EmptyRegion(Rect, u32, u32),
    /// The frame buffer is shorter than its dimensions claim
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    TruncatedFrame { expected: usize, actual: usize },
}

/// Output size after fitting `w` x `h` inside the target box (never upscaled)
pub fn target_size(w: u32, h: u32, config: &ConditioningConfig) -> (u32, u32) {
    let scale_w = config.max_width as f32 / w as f32;
    let scale_h = config.max_height as f32 / h as f32;
    let scale = scale_w.min(scale_h).min(1.0);

    let out_w = ((w as f32 * scale).round() as u32).clamp(1, w);
    let out_h = ((h as f32 * scale).round() as u32).clamp(1, h);
    (out_w, out_h)
}

/// Condition one region of a frame into a binary raster
pub fn condition_region(
    frame: &CapturedFrame,
    rect: Rect,
    config: &ConditioningConfig,
) -> Result<BinaryRaster, ConditionError> {
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.data.len() < expected {
        return Err(ConditionError::TruncatedFrame {
            expected,
            actual: frame.data.len(),
        });
    }

    let rect = clamp_rect(rect, frame.width, frame.height)
        .ok_or(ConditionError::EmptyRegion(rect, frame.width, frame.height))?;

    let (out_w, out_h) = target_size(rect.w, rect.h, config);
    trace!(
        "Conditioning {}x{} region at ({}, {}) into {}x{}",
        rect.w, rect.h, rect.x, rect.y, out_w, out_h
    );

    let (low, high) = if config.invert {
        (LEVEL_HIGH, LEVEL_LOW)
    } else {
        (LEVEL_LOW, LEVEL_HIGH)
    };

    let mut raster = GrayImage::new(out_w, out_h);
    for oy in 0..out_h {
        let sy = rect.y + sample_offset(oy, out_h, rect.h);
        for ox in 0..out_w {
            let sx = rect.x + sample_offset(ox, out_w, rect.w);
            let idx = (sy as usize * frame.width as usize + sx as usize) * 4;
            let px = &frame.data[idx..idx + 4];

            let adjusted = apply_contrast(luminance(px), config.contrast);
            let level = if adjusted > config.threshold { high } else { low };
            raster.put_pixel(ox, oy, Luma([level]));
        }
    }

    Ok(raster)
}

/// Mean of the R, G and B intensities
fn luminance(px: &[u8]) -> f32 {
    (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0
}

/// Linear contrast around the mid-gray point (128)
fn apply_contrast(value: f32, factor: f32) -> f32 {
    (value - 128.0) * factor + 128.0
}

/// Source offset sampled for output index `i` (center of the covered span)
fn sample_offset(i: u32, out_len: u32, src_len: u32) -> u32 {
    let offset = ((2 * i as u64 + 1) * src_len as u64) / (2 * out_len as u64);
    (offset as u32).min(src_len - 1)
}

/// Clip a rectangle to the frame; None if nothing remains
fn clamp_rect(rect: Rect, width: u32, height: u32) -> Option<Rect> {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    let w = rect.w.min(width - x);
    let h = rect.h.min(height - y);
    (w > 0 && h > 0).then_some(Rect { x, y, w, h })
}
