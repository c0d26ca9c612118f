//! Application Configuration
//!
//! Scanner settings stored in TOML format: capture source, scan cadence,
//! recognition engine, tracked fields and the result sink.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::ocr::SegmentationMode;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Frame source settings
    pub capture: CaptureSettings,
    /// Scan loop and stability settings
    pub scan: ScanSettings,
    /// Recognition engine settings
    pub engine: EngineSettings,
    /// Tracked fields, one ROI each
    pub fields: Vec<FieldConfig>,
    /// Result sink settings
    pub sink: SinkSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            capture: CaptureSettings::default(),
            scan: ScanSettings::default(),
            engine: EngineSettings::default(),
            fields: vec![FieldConfig::default()],
            sink: SinkSettings::default(),
        }
    }
}

impl AppConfig {
    /// Look up a field by its identifier
    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.interval_ms == 0 {
            anyhow::bail!("scan.interval_ms must be greater than zero");
        }
        if self.scan.history_capacity == 0 {
            anyhow::bail!("scan.history_capacity must be at least 1");
        }
        if let Some(floor) = self.scan.min_confidence {
            if !(0.0..=100.0).contains(&floor) {
                anyhow::bail!("scan.min_confidence must lie in [0, 100], got {}", floor);
            }
        }
        if self.fields.is_empty() {
            anyhow::bail!("at least one field must be configured");
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.id.is_empty() {
                anyhow::bail!("field #{} has an empty id", i);
            }
            if self.fields[..i].iter().any(|f| f.id == field.id) {
                anyhow::bail!("duplicate field id '{}'", field.id);
            }
            if field.conditioning.max_width == 0 || field.conditioning.max_height == 0 {
                anyhow::bail!("field '{}': conditioning target size must be non-zero", field.id);
            }
            if field.normalization.alphabet.is_empty() {
                anyhow::bail!("field '{}': alphabet must not be empty", field.id);
            }
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    /// Directory that receives every conditioned raster (debugging aid)
    pub debug_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_dir: None,
        }
    }
}

/// Frame source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Image file or directory of frames to replay
    pub source: Option<PathBuf>,
    /// Replay rate in frames per second
    pub fps: u32,
    /// Start over after the last frame
    pub loop_frames: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source: None,
            fps: 30,
            loop_frames: true,
        }
    }
}

/// Scan cadence and consensus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Tick interval in milliseconds
    pub interval_ms: u64,
    /// Number of identical consecutive reads required to confirm
    pub history_capacity: usize,
    /// Minimum recognition confidence (0-100); None disables gating
    pub min_confidence: Option<f32>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            history_capacity: 3,
            min_confidence: Some(50.0),
        }
    }
}

/// Tesseract executable settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Path or command name of the tesseract executable
    pub tesseract_path: PathBuf,
    /// Recognition language
    pub language: String,
    /// Optional tessdata directory
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            tessdata_dir: None,
        }
    }
}

/// A tracked field: one screen band, conditioned and read independently
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Field identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Characters the engine may emit
    pub whitelist: String,
    /// Engine page segmentation mode
    pub segmentation: SegmentationMode,
    /// Proportional placement of the field's ROI
    pub band: RoiBand,
    /// Crop/scale/binarization parameters
    pub conditioning: ConditioningConfig,
    /// Text cleanup rules
    pub normalization: NormalizationRules,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            id: "pea".to_string(),
            name: "PEA number".to_string(),
            band: RoiBand::default(),
            whitelist: "0123456789OIl|".to_string(),
            segmentation: SegmentationMode::SingleLine,
            conditioning: ConditioningConfig::default(),
            normalization: NormalizationRules::default(),
        }
    }
}

/// ROI placement as fractions of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiBand {
    /// Band width relative to frame width, centered horizontally
    pub width_frac: f32,
    /// Band height relative to frame height
    pub height_frac: f32,
    /// Vertical center of the band relative to frame height
    pub center_y_frac: f32,
}

impl Default for RoiBand {
    fn default() -> Self {
        Self {
            width_frac: 0.7,
            height_frac: 0.25,
            center_y_frac: 0.5,
        }
    }
}

/// Image conditioning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Maximum output width (the ROI is only ever scaled down)
    pub max_width: u32,
    /// Maximum output height
    pub max_height: u32,
    /// Linear contrast factor around mid-gray
    pub contrast: f32,
    /// Binarization threshold on the adjusted luminance
    pub threshold: f32,
    /// Swap output levels (light digits on dark background)
    pub invert: bool,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            max_width: 640,
            max_height: 360,
            contrast: 1.15,
            threshold: 160.0,
            invert: false,
        }
    }
}

/// Look-alike characters that should read as a given digit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusableRule {
    /// Replacement character
    pub digit: char,
    /// Characters replaced by `digit`
    pub lookalikes: String,
}

/// Text normalization rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Accepted output characters
    pub alphabet: String,
    /// Maximum output length in characters
    pub max_len: usize,
    /// Literal prefix preceding the digit run (e.g. "PEA")
    pub prefix: Option<String>,
    /// Confusable substitutions applied before filtering
    pub confusables: Vec<ConfusableRule>,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            confusables: vec![
                ConfusableRule {
                    digit: '0',
                    lookalikes: "O".to_string(),
                },
                ConfusableRule {
                    digit: '1',
                    lookalikes: "Il|".to_string(),
                },
            ],
            alphabet: "0123456789".to_string(),
            max_len: 32,
            prefix: None,
        }
    }
}

/// Body encoding used when posting a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkContentType {
    /// JSON body sent as text/plain (avoids CORS preflight on script endpoints)
    #[default]
    PlainText,
    /// JSON body sent as application/json
    Json,
}

/// Result sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Endpoint URL; None disables submission
    pub endpoint: Option<String>,
    /// JSON key the value is sent under
    pub payload_key: String,
    /// Request body content type
    pub content_type: SinkContentType,
    /// Optional bearer token
    pub bearer_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Submit every confirmed value automatically
    pub auto_submit: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            payload_key: "peaNumber".to_string(),
            content_type: SinkContentType::PlainText,
            bearer_token: None,
            timeout_secs: 15,
            auto_submit: false,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
