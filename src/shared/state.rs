//! Shared scanner state
//!
//! All mutable pipeline state lives in one record: the lifecycle flags, the
//! stability windows and confirmed values, and the last user-visible error.

use crate::analysis::stability::{ConfirmedValue, StabilityConfig, StabilityFilter};
use crate::config::AppConfig;

/// Central scanner state shared by the session and the orchestrator
#[derive(Debug)]
pub struct SharedScanState {
    /// Configuration the session was built with
    pub config: AppConfig,
    /// Lifecycle flags (not persisted)
    pub runtime: PipelineState,
    /// Per-field history windows and confirmed values
    pub stability: StabilityFilter,
}

impl Default for SharedScanState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl SharedScanState {
    /// Create a new shared state with the given configuration
    pub fn new(config: AppConfig) -> Self {
        let stability = StabilityFilter::new(StabilityConfig::from_settings(&config.scan));
        Self {
            config,
            runtime: PipelineState::default(),
            stability,
        }
    }

    /// Confirmed value of a field, if any
    pub fn confirmed(&self, field_id: &str) -> Option<&ConfirmedValue> {
        self.stability.confirmed(field_id)
    }

    /// Whether every configured field has a confirmed value
    pub fn all_confirmed(&self) -> bool {
        self.config
            .fields
            .iter()
            .all(|f| self.stability.confirmed(&f.id).is_some())
    }
}

/// Pipeline lifecycle flags
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// The frame source is delivering frames
    pub streaming: bool,
    /// The recognition engine is loaded
    pub recognition_ready: bool,
    /// Ticks should start passes
    pub scanning: bool,
    /// A recognition pass is in flight
    pub busy: bool,
    /// Passes run since the session started
    pub passes: u64,
    /// Last user-visible error message (if any)
    pub last_error: Option<String>,
}

impl PipelineState {
    /// Whether a frame can be read on demand (ignoring `busy`)
    pub fn can_read(&self) -> bool {
        self.streaming && self.recognition_ready
    }

    /// Whether a tick may start a pass (ignoring `busy`)
    pub fn can_scan(&self) -> bool {
        self.scanning && self.can_read()
    }

    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
