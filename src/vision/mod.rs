//! Vision/OCR Layer
//!
//! Region placement, image conditioning, the recognition engine seam and
//! text normalization.

pub mod normalize;
pub mod ocr;
pub mod ocr_preprocess;
pub mod roi;
pub mod tesseract;

pub use ocr::RecognitionEngine;
pub use tesseract::TesseractEngine;
