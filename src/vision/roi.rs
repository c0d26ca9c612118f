//! Region-of-interest calculation
//!
//! Each field occupies a fixed proportional band of the frame. The calculator
//! is pure: it depends only on the frame dimensions, so an overlay renderer can
//! call it at any rate independently of the recognition cadence.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::capture::frame::CapturedFrame;
use crate::config::{FieldConfig, RoiBand};

/// Overlay outline color
const OVERLAY_COLOR: Rgba<u8> = Rgba([52, 211, 153, 255]);

/// Pixel rectangle in native frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[cfg(test)]
impl Rect {
    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    /// Whether the rectangle lies inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.w > 0 && self.h > 0 && self.right() <= width && self.bottom() <= height
    }
}

/// A field's rectangle for the current frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegion {
    pub field_id: String,
    pub rect: Rect,
}

/// Compute one band's rectangle; None when the frame has no size yet
pub fn compute_region(width: u32, height: u32, band: &RoiBand) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }

    let width_frac = band.width_frac.clamp(0.0, 1.0);
    let height_frac = band.height_frac.clamp(0.0, 1.0);
    let center_y = band.center_y_frac.clamp(0.0, 1.0);

    let w = ((width as f32 * width_frac).floor() as u32).clamp(1, width);
    let h = ((height as f32 * height_frac).floor() as u32).clamp(1, height);

    let x = (width - w) / 2;
    let top = (height as f32 * center_y - h as f32 / 2.0).floor().max(0.0) as u32;
    let y = top.min(height - h);

    Some(Rect { x, y, w, h })
}

/// Maps frame dimensions to one rectangle per configured field
#[derive(Debug, Clone)]
pub struct RoiCalculator {
    bands: Vec<(String, RoiBand)>,
}

impl RoiCalculator {
    /// Build a calculator for the given fields
    pub fn new(fields: &[FieldConfig]) -> Self {
        Self {
            bands: fields.iter().map(|f| (f.id.clone(), f.band)).collect(),
        }
    }

    /// All field regions, or None when no region is available
    pub fn compute(&self, width: u32, height: u32) -> Option<Vec<FieldRegion>> {
        if width == 0 || height == 0 {
            return None;
        }

        self.bands
            .iter()
            .map(|(id, band)| {
                compute_region(width, height, band).map(|rect| FieldRegion {
                    field_id: id.clone(),
                    rect,
                })
            })
            .collect()
    }
}

/// Draw every region's outline onto a copy of the frame
pub fn render_overlay(frame: &CapturedFrame, regions: &[FieldRegion]) -> Option<RgbaImage> {
    let mut canvas = frame.to_rgba_image()?;

    for region in regions {
        let rect = region.rect;
        // Two nested outlines for a 2px border
        for inset in 0..2u32 {
            if rect.w <= inset * 2 || rect.h <= inset * 2 {
                break;
            }
            let outline = imageproc::rect::Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
                .of_size(rect.w - inset * 2, rect.h - inset * 2);
            draw_hollow_rect_mut(&mut canvas, outline, OVERLAY_COLOR);
        }
    }

    Some(canvas)
}
