//! Recognition engine abstraction
//!
//! The engine is an opaque capability: a binary raster goes in, text and a
//! confidence score come out. Callers configure the whitelist and
//! segmentation mode immediately before each call and never overlap calls on
//! one instance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vision::ocr_preprocess::BinaryRaster;

/// Page segmentation mode passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// A single uniform block of text
    SingleBlock,
    /// A single text line
    #[default]
    SingleLine,
    /// A single word
    SingleWord,
    /// Sparse text in no particular order
    SparseText,
    /// A raw line, bypassing engine-specific layout hacks
    RawLine,
}

impl SegmentationMode {
    /// Tesseract `--psm` value
    pub fn psm(&self) -> u8 {
        match self {
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SingleWord => 8,
            SegmentationMode::SparseText => 11,
            SegmentationMode::RawLine => 13,
        }
    }
}

/// Per-call engine parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    /// Characters the engine may emit
    pub whitelist: String,
    /// Segmentation mode
    pub segmentation: SegmentationMode,
}

/// Raw engine output for one raster
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    /// Recognized text, untrimmed
    pub text: String,
    /// Confidence score (0-100)
    pub confidence: f32,
}

/// Engine failures
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be brought up
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
    /// `recognize` or `configure` after `dispose`
    #[error("recognition engine already disposed")]
    Disposed,
    /// The engine ran but failed
    #[error("recognition failed: {0}")]
    Failed(String),
    /// Any other engine-side failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Text recognition capability
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Set whitelist and segmentation mode for subsequent calls
    fn configure(&mut self, params: &EngineParams) -> Result<(), EngineError>;

    /// Recognize the text in a binary raster
    async fn recognize(&mut self, raster: &BinaryRaster) -> Result<RecognitionResult, EngineError>;

    /// Release engine resources
    async fn dispose(&mut self) -> Result<(), EngineError>;
}
