//! Scan session lifecycle
//!
//! Owns the frame source, the periodic task and the orchestrator, and maps
//! user actions (camera on/off, scan on/off, single reads, manual entry,
//! history reset, teardown) onto the shared pipeline flags.

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::analysis::events::{EventEmitter, ScanEvent, SkipReason};
use crate::analysis::stability::ConfirmedValue;
use crate::capture::frame::CapturedFrame;
use crate::capture::{CaptureError, FrameSource};
use crate::config::AppConfig;
use crate::scanner::orchestrator::{Orchestrator, PassSummary, SharedSource};
use crate::scanner::ticker::PeriodicTask;
use crate::shared::{PipelineState, SharedScanState};
use crate::vision::ocr::{EngineError, RecognitionEngine};

/// A camera-to-confirmed-value scanning session
pub struct ScanSession {
    state: Arc<RwLock<SharedScanState>>,
    source: SharedSource,
    orchestrator: Arc<Orchestrator>,
    ticker: PeriodicTask,
    events: Arc<EventEmitter>,
    torn_down: bool,
}

impl ScanSession {
    /// Build a session around a frame source. Nothing is started yet.
    pub fn new(config: AppConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        let interval = Duration::from_millis(config.scan.interval_ms);
        let state = Arc::new(RwLock::new(SharedScanState::new(config)));
        let source: SharedSource = Arc::new(Mutex::new(source));
        let events = Arc::new(EventEmitter::new());
        let orchestrator = Arc::new(Orchestrator::new(
            state.clone(),
            source.clone(),
            events.clone(),
        )?);

        Ok(Self {
            state,
            source,
            orchestrator,
            ticker: PeriodicTask::new(interval),
            events,
            torn_down: false,
        })
    }

    /// Shared state handle
    pub fn state(&self) -> Arc<RwLock<SharedScanState>> {
        self.state.clone()
    }

    /// Snapshot of the lifecycle flags
    pub fn pipeline(&self) -> PipelineState {
        self.state.read().runtime.clone()
    }

    /// Orchestrator handle
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// Current frame of the source, None while stopped
    pub fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.source.lock().current_frame()
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Install the outcome of engine initialization
    ///
    /// On failure the error is surfaced and recognition stays unavailable;
    /// the camera may still run.
    pub async fn attach_engine(
        &self,
        engine: Result<Box<dyn RecognitionEngine>, EngineError>,
    ) -> Result<(), EngineError> {
        match engine {
            Ok(engine) => {
                self.orchestrator.install_engine(engine).await;
                info!("Recognition engine ready");
                Ok(())
            }
            Err(e) => {
                self.report_error(format!("Failed to load OCR engine: {}", e));
                self.state.write().runtime.recognition_ready = false;
                Err(e)
            }
        }
    }

    /// Start frame acquisition
    pub fn start_camera(&mut self) -> Result<(), CaptureError> {
        let started = self.source.lock().start();
        match started {
            Ok(()) => {
                let mut state = self.state.write();
                state.runtime.streaming = true;
                state.runtime.clear_error();
                drop(state);
                info!("Camera started");
                Ok(())
            }
            Err(e) => {
                self.report_error(format!("Cannot access the camera: {}", e));
                Err(e)
            }
        }
    }

    /// Stop frame acquisition; also stops scanning. Safe to call repeatedly.
    pub fn stop_camera(&mut self) {
        self.ticker.stop();
        self.source.lock().stop();

        let mut state = self.state.write();
        let was_streaming = state.runtime.streaming;
        state.runtime.streaming = false;
        state.runtime.scanning = false;
        state.runtime.busy = false;
        drop(state);

        if was_streaming {
            info!("Camera stopped");
        }
    }

    /// Toggle the camera; returns whether it is now streaming
    pub fn toggle_camera(&mut self) -> Result<bool, CaptureError> {
        if self.state.read().runtime.streaming {
            self.stop_camera();
            Ok(false)
        } else {
            self.start_camera()?;
            Ok(true)
        }
    }

    /// Begin periodic passes; returns false when the camera or engine is not ready
    pub fn start_scanning(&mut self) -> bool {
        {
            let mut state = self.state.write();
            if !state.runtime.streaming || !state.runtime.recognition_ready {
                debug!(
                    "Cannot start scanning (streaming: {}, engine ready: {})",
                    state.runtime.streaming, state.runtime.recognition_ready
                );
                return false;
            }
            state.runtime.scanning = true;
        }

        let orchestrator = self.orchestrator.clone();
        self.ticker.start(move || {
            let orchestrator = orchestrator.clone();
            async move {
                orchestrator.tick();
            }
        });
        info!("Scanning every {:?}", self.ticker.interval());
        true
    }

    /// Stop periodic passes; the camera keeps running
    pub fn stop_scanning(&mut self) {
        self.ticker.stop();
        let mut state = self.state.write();
        if state.runtime.scanning {
            state.runtime.scanning = false;
            info!("Scanning stopped");
        }
    }

    /// Toggle scanning; returns whether it is now on
    pub fn toggle_scanning(&mut self) -> bool {
        if self.state.read().runtime.scanning {
            self.stop_scanning();
            false
        } else {
            self.start_scanning()
        }
    }

    /// Read the current frame once, independently of the timer
    pub async fn read_once(&self) -> Result<PassSummary, SkipReason> {
        self.orchestrator.run_once().await
    }

    /// Confirmed value of a field
    pub fn confirmed(&self, field_id: &str) -> Option<ConfirmedValue> {
        self.state.read().confirmed(field_id).cloned()
    }

    /// Install a value typed by the user as the field's confirmed value
    pub fn set_manual_value(&self, field_id: &str, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            anyhow::bail!("Manual value for {} is empty", field_id);
        }
        let mut state = self.state.write();
        if state.config.field(field_id).is_none() {
            anyhow::bail!("Unknown field: {}", field_id);
        }
        let previous = state.stability.set_manual(field_id, value);
        drop(state);

        info!("{} set manually to {}", field_id, value);
        if previous.as_deref() != Some(value) {
            self.events.emit(ScanEvent::ValueConfirmed {
                field_id: field_id.to_string(),
                previous,
                value: value.to_string(),
                confidence: 100.0,
            });
        }
        Ok(())
    }

    /// Forget the reading history of one field, or of every field
    ///
    /// Confirmed values are kept; a new consensus has to build up from scratch.
    pub fn reset_history(&self, field_id: Option<&str>) -> Result<()> {
        let mut state = self.state.write();
        let ids: Vec<String> = match field_id {
            Some(id) if state.config.field(id).is_none() => anyhow::bail!("Unknown field: {}", id),
            Some(id) => vec![id.to_string()],
            None => state.config.fields.iter().map(|f| f.id.clone()).collect(),
        };
        for id in &ids {
            state.stability.reset(id);
        }
        drop(state);

        info!("Reading history cleared for {}", ids.join(", "));
        Ok(())
    }

    /// Release camera, timer and engine. Idempotent.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.stop_camera();
        self.orchestrator.dispose_engine().await;
        debug!("Session torn down");
    }

    fn report_error(&self, message: String) {
        error!("{}", message);
        self.state.write().runtime.set_error(message.clone());
        self.events.emit(ScanEvent::SessionError { message });
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.stop_camera();

        // Engine disposal is async; hand it to the runtime if there is one
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let orchestrator = self.orchestrator.clone();
                handle.spawn(async move {
                    orchestrator.dispose_engine().await;
                });
            }
            Err(_) => warn!("No runtime available, engine dropped without dispose"),
        }
    }
}
