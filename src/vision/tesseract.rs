//! Tesseract backend
//!
//! Drives the `tesseract` executable: each raster is written to a temporary
//! PNG and recognized in TSV mode, which carries per-word confidences.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::Builder;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::vision::ocr::{EngineError, EngineParams, RecognitionEngine, RecognitionResult};
use crate::vision::ocr_preprocess::BinaryRaster;

/// Recognition engine backed by the tesseract command line tool
pub struct TesseractEngine {
    executable: PathBuf,
    language: String,
    tessdata_dir: Option<PathBuf>,
    params: EngineParams,
    disposed: bool,
}

impl TesseractEngine {
    /// Verify the executable runs and build an engine
    pub async fn start(settings: &EngineSettings) -> Result<Self, EngineError> {
        let output = Command::new(&settings.tesseract_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "cannot run {:?}: {}",
                    settings.tesseract_path, e
                ))
            })?;

        if !output.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{:?} --version exited with {}",
                settings.tesseract_path, output.status
            )));
        }

        // Older releases print the banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };
        info!(
            "Tesseract ready: {}",
            banner.lines().next().unwrap_or("unknown version")
        );

        Ok(Self {
            executable: settings.tesseract_path.clone(),
            language: settings.language.clone(),
            tessdata_dir: settings.tessdata_dir.clone(),
            params: EngineParams {
                whitelist: String::new(),
                segmentation: Default::default(),
            },
            disposed: false,
        })
    }

    /// Arguments for one recognition call (after the input path)
    fn build_args(&self) -> Vec<String> {
        let mut args = vec!["stdout".to_string()];
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string_lossy().to_string());
        }
        args.push("-l".to_string());
        args.push(self.language.clone());
        args.push("--psm".to_string());
        args.push(self.params.segmentation.psm().to_string());
        if !self.params.whitelist.is_empty() {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", self.params.whitelist));
        }
        args.push("tsv".to_string());
        args
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    fn configure(&mut self, params: &EngineParams) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        self.params = params.clone();
        Ok(())
    }

    async fn recognize(&mut self, raster: &BinaryRaster) -> Result<RecognitionResult, EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }

        let input = Builder::new()
            .prefix("digit-scan-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temporary raster file")?;
        raster
            .save(input.path())
            .context("Failed to write temporary raster file")?;

        let output = Command::new(&self.executable)
            .arg(input.path())
            .args(self.build_args())
            .output()
            .await
            .context("Failed to run tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(stderr.trim().to_string()));
        }

        let result = parse_tsv_output(&String::from_utf8_lossy(&output.stdout));
        debug!(
            "Tesseract read {:?} (confidence {:.1})",
            result.text, result.confidence
        );
        Ok(result)
    }

    async fn dispose(&mut self) -> Result<(), EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        self.disposed = true;
        debug!("Tesseract engine disposed");
        Ok(())
    }
}

/// Parse Tesseract TSV output into text plus mean word confidence
///
/// TSV columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Only word rows (level 5) with a
/// non-negative confidence count.
pub fn parse_tsv_output(tsv: &str) -> RecognitionResult {
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut current_line: Option<(i32, i32, i32)> = None;
    let mut conf_sum = 0.0f32;
    let mut word_count = 0usize;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_line != Some(key) {
            lines.push(Vec::new());
            current_line = Some(key);
        }
        if let Some(line) = lines.last_mut() {
            line.push(text.to_string());
        }

        conf_sum += conf;
        word_count += 1;
    }

    let text = lines
        .iter()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence = if word_count > 0 {
        (conf_sum / word_count as f32).clamp(0.0, 100.0)
    } else {
        0.0
    };

    RecognitionResult { text, confidence }
}
