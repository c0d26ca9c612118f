//! Recognition pass orchestration
//!
//! A pass snapshots the current frame, computes every field's region and,
//! field by field, conditions the region, runs the engine, normalizes the
//! text and feeds the stability filter. At most one pass is in flight: a tick
//! that finds `busy` set is dropped, never queued.

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::analysis::events::{EventEmitter, ScanEvent, SkipReason};
use crate::analysis::stability::Observation;
use crate::capture::frame::CapturedFrame;
use crate::capture::FrameSource;
use crate::config::FieldConfig;
use crate::shared::SharedScanState;
use crate::vision::normalize::TextNormalizer;
use crate::vision::ocr::{EngineParams, RecognitionEngine};
use crate::vision::ocr_preprocess::{condition_region, BinaryRaster};
use crate::vision::roi::{Rect, RoiCalculator};

/// Frame source shared between the session and the orchestrator
pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// Result of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A pass was spawned
    Started,
    /// Nothing was started
    Skipped(SkipReason),
}

/// One field's read within a pass
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReading {
    pub field_id: String,
    pub raw: String,
    pub value: String,
    pub confidence: f32,
    pub observation: Observation,
}

/// Outcome of a completed pass
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub pass: u64,
    pub readings: Vec<FieldReading>,
    pub failures: usize,
    pub elapsed: Duration,
}

struct FieldPipeline {
    field: FieldConfig,
    params: EngineParams,
    normalizer: TextNormalizer,
}

/// Clears `busy` when a pass ends, however it ends
struct BusyGuard {
    state: Arc<RwLock<SharedScanState>>,
    pass: u64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut state = self.state.write();
        // A stop/start cycle may have begun a newer pass meanwhile
        if state.runtime.passes == self.pass {
            state.runtime.busy = false;
        }
    }
}

/// Runs recognition passes against the shared state
pub struct Orchestrator {
    state: Arc<RwLock<SharedScanState>>,
    source: SharedSource,
    engine: tokio::sync::Mutex<Option<Box<dyn RecognitionEngine>>>,
    fields: Vec<FieldPipeline>,
    roi: RoiCalculator,
    events: Arc<EventEmitter>,
    debug_dir: Option<PathBuf>,
}

impl Orchestrator {
    /// Build an orchestrator for the fields in the shared config
    pub fn new(
        state: Arc<RwLock<SharedScanState>>,
        source: SharedSource,
        events: Arc<EventEmitter>,
    ) -> Result<Self> {
        let (configs, debug_dir) = {
            let s = state.read();
            (s.config.fields.clone(), s.config.general.debug_dir.clone())
        };

        let fields = configs
            .iter()
            .map(|field| {
                let normalizer = TextNormalizer::new(&field.normalization)
                    .with_context(|| format!("Invalid normalization rules for field {}", field.id))?;
                Ok(FieldPipeline {
                    params: EngineParams {
                        whitelist: field.whitelist.clone(),
                        segmentation: field.segmentation,
                    },
                    normalizer,
                    field: field.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roi: RoiCalculator::new(&configs),
            state,
            source,
            engine: tokio::sync::Mutex::new(None),
            fields,
            events,
            debug_dir,
        })
    }

    /// Region calculator for the configured fields
    pub fn roi(&self) -> &RoiCalculator {
        &self.roi
    }

    /// Hand the engine to the orchestrator and mark recognition ready
    pub async fn install_engine(&self, engine: Box<dyn RecognitionEngine>) {
        let previous = self.engine.lock().await.replace(engine);
        if let Some(mut old) = previous {
            if let Err(e) = old.dispose().await {
                warn!("Failed to dispose replaced engine: {}", e);
            }
        }
        self.state.write().runtime.recognition_ready = true;
    }

    /// Dispose the engine; returns false if there was none left to dispose
    ///
    /// Waits for an in-flight pass to release the engine first.
    pub async fn dispose_engine(&self) -> bool {
        self.state.write().runtime.recognition_ready = false;

        let taken = self.engine.lock().await.take();
        match taken {
            Some(mut engine) => {
                if let Err(e) = engine.dispose().await {
                    warn!("Engine dispose failed: {}", e);
                }
                info!("Recognition engine disposed");
                true
            }
            None => false,
        }
    }

    /// Timer entry point: start a pass in the background unless one is running
    pub fn tick(self: &Arc<Self>) -> TickOutcome {
        match self.try_begin(false) {
            Ok(guard) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    if let Ok(summary) = this.run_pass(guard).await {
                        trace!(
                            "Pass {}: {} read, {} failed",
                            summary.pass,
                            summary.readings.len(),
                            summary.failures
                        );
                    }
                });
                TickOutcome::Started
            }
            Err(reason) => {
                if reason == SkipReason::Busy {
                    debug!("Pass still in flight, dropping tick");
                    self.events.emit(ScanEvent::PassSkipped { reason });
                } else {
                    trace!("Tick skipped: {:?}", reason);
                }
                TickOutcome::Skipped(reason)
            }
        }
    }

    /// Run one pass to completion on the caller's task
    ///
    /// Needs a streaming source and a ready engine but not the scanning flag,
    /// so a single frame can be read while the timer is off.
    pub async fn run_once(&self) -> Result<PassSummary, SkipReason> {
        let guard = self.try_begin(true)?;
        self.run_pass(guard).await
    }

    fn try_begin(&self, on_demand: bool) -> Result<BusyGuard, SkipReason> {
        let mut state = self.state.write();
        let active = if on_demand {
            state.runtime.can_read()
        } else {
            state.runtime.can_scan()
        };
        if !active {
            return Err(SkipReason::Inactive);
        }
        if state.runtime.busy {
            return Err(SkipReason::Busy);
        }
        state.runtime.busy = true;
        state.runtime.passes += 1;

        Ok(BusyGuard {
            state: Arc::clone(&self.state),
            pass: state.runtime.passes,
        })
    }

    fn skip(&self, reason: SkipReason) -> Result<PassSummary, SkipReason> {
        debug!("Pass skipped: {:?}", reason);
        self.events.emit(ScanEvent::PassSkipped { reason });
        Err(reason)
    }

    async fn run_pass(&self, guard: BusyGuard) -> Result<PassSummary, SkipReason> {
        let started = Instant::now();

        let frame = self.source.lock().current_frame();
        let Some(frame) = frame else {
            return self.skip(SkipReason::NoRegion);
        };
        let Some(regions) = self.roi.compute(frame.width, frame.height) else {
            return self.skip(SkipReason::NoRegion);
        };

        let mut engine_slot = self.engine.lock().await;
        let Some(engine) = engine_slot.as_mut() else {
            return self.skip(SkipReason::Inactive);
        };

        let mut readings = Vec::with_capacity(self.fields.len());
        let mut failures = 0;

        for (pipeline, region) in self.fields.iter().zip(&regions) {
            match self
                .read_field(engine.as_mut(), pipeline, &frame, region.rect, guard.pass)
                .await
            {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    failures += 1;
                    warn!("Field {} failed in pass {}: {:#}", pipeline.field.id, guard.pass, e);
                    self.events.emit(ScanEvent::FieldFailed {
                        field_id: pipeline.field.id.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        drop(engine_slot);

        let elapsed = started.elapsed();
        debug!(
            "Pass {} read {} field(s) in {:?}",
            guard.pass,
            readings.len(),
            elapsed
        );
        self.events.emit(ScanEvent::PassCompleted {
            pass: guard.pass,
            fields_read: readings.len(),
            elapsed_ms: elapsed.as_millis() as u64,
        });

        Ok(PassSummary {
            pass: guard.pass,
            readings,
            failures,
            elapsed,
        })
    }

    async fn read_field(
        &self,
        engine: &mut dyn RecognitionEngine,
        pipeline: &FieldPipeline,
        frame: &CapturedFrame,
        rect: Rect,
        pass: u64,
    ) -> Result<FieldReading> {
        let field_id = &pipeline.field.id;
        let raster = condition_region(frame, rect, &pipeline.field.conditioning)?;

        if let Some(dir) = &self.debug_dir {
            save_debug_raster(dir, field_id, pass, &raster);
        }

        engine.configure(&pipeline.params)?;
        let result = engine.recognize(&raster).await?;
        let value = pipeline.normalizer.normalize(&result.text);
        trace!("{}: raw {:?} -> {:?}", field_id, result.text, value);

        let observation = self
            .state
            .write()
            .stability
            .observe(field_id, &value, result.confidence);

        match &observation {
            Observation::Confirmed { value: confirmed, previous }
                if previous.as_deref() != Some(confirmed.value.as_str()) =>
            {
                info!(
                    "{} confirmed: {} (confidence {:.1})",
                    pipeline.field.name, confirmed.value, confirmed.confidence
                );
                self.events.emit(ScanEvent::ValueConfirmed {
                    field_id: field_id.clone(),
                    previous: previous.clone(),
                    value: confirmed.value.clone(),
                    confidence: confirmed.confidence,
                });
            }
            Observation::Confirmed { .. } => trace!("{} reconfirmed", field_id),
            Observation::LowConfidence => debug!(
                "{}: consensus on {:?} below confidence floor ({:.1})",
                field_id, value, result.confidence
            ),
            Observation::Pending | Observation::Ignored => {}
        }

        Ok(FieldReading {
            field_id: field_id.clone(),
            raw: result.text,
            value,
            confidence: result.confidence,
            observation,
        })
    }
}

fn save_debug_raster(dir: &Path, field_id: &str, pass: u64, raster: &BinaryRaster) {
    let path = dir.join(format!("{}-{}.png", field_id, pass));
    let saved = std::fs::create_dir_all(dir)
        .map_err(anyhow::Error::from)
        .and_then(|_| raster.save(&path).map_err(anyhow::Error::from));
    if let Err(e) = saved {
        warn!("Failed to write debug raster {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, StillFrameSource};
    use crate::config::AppConfig;
    use crate::vision::ocr::{EngineError, RecognitionResult};
    use async_trait::async_trait;
    use crossbeam_channel::Receiver;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Counters {
        configure: AtomicUsize,
        recognize: AtomicUsize,
        dispose: AtomicUsize,
    }

    /// Replays scripted reads, repeating the last one
    struct ScriptedEngine {
        reads: VecDeque<Result<RecognitionResult, String>>,
        counters: Arc<Counters>,
        last_params: Arc<Mutex<Option<EngineParams>>>,
    }

    impl ScriptedEngine {
        fn new(reads: &[(&str, f32)]) -> Self {
            Self {
                reads: reads
                    .iter()
                    .map(|(text, confidence)| {
                        Ok(RecognitionResult {
                            text: text.to_string(),
                            confidence: *confidence,
                        })
                    })
                    .collect(),
                counters: Arc::new(Counters::default()),
                last_params: Arc::new(Mutex::new(None)),
            }
        }

        fn failing() -> Self {
            Self::from_reads(vec![Err("engine crashed".to_string())])
        }

        fn from_reads(reads: Vec<Result<RecognitionResult, String>>) -> Self {
            let mut engine = Self::new(&[]);
            engine.reads = reads.into();
            engine
        }
    }

    #[async_trait]
    impl RecognitionEngine for ScriptedEngine {
        fn configure(&mut self, params: &EngineParams) -> Result<(), EngineError> {
            self.counters.configure.fetch_add(1, Ordering::SeqCst);
            *self.last_params.lock() = Some(params.clone());
            Ok(())
        }

        async fn recognize(&mut self, _raster: &BinaryRaster) -> Result<RecognitionResult, EngineError> {
            self.counters.recognize.fetch_add(1, Ordering::SeqCst);
            let next = if self.reads.len() > 1 {
                self.reads.pop_front()
            } else {
                self.reads.front().cloned()
            };
            match next {
                Some(Ok(result)) => Ok(result),
                Some(Err(message)) => Err(EngineError::Failed(message)),
                None => Ok(RecognitionResult {
                    text: String::new(),
                    confidence: 0.0,
                }),
            }
        }

        async fn dispose(&mut self) -> Result<(), EngineError> {
            self.counters.dispose.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Blocks every recognition until the gate is opened
    struct GatedEngine {
        gate: Arc<Notify>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RecognitionEngine for GatedEngine {
        fn configure(&mut self, _params: &EngineParams) -> Result<(), EngineError> {
            Ok(())
        }

        async fn recognize(&mut self, _raster: &BinaryRaster) -> Result<RecognitionResult, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(RecognitionResult {
                text: "42".to_string(),
                confidence: 90.0,
            })
        }

        async fn dispose(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    /// Counts frame snapshots
    struct CountingSource {
        inner: StillFrameSource,
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.inner.start()
        }

        fn stop(&mut self) {
            self.inner.stop()
        }

        fn is_streaming(&self) -> bool {
            self.inner.is_streaming()
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.inner.dimensions()
        }

        fn current_frame(&self) -> Option<Arc<CapturedFrame>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.current_frame()
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        state: Arc<RwLock<SharedScanState>>,
        frame_reads: Arc<AtomicUsize>,
        events: Receiver<ScanEvent>,
    }

    fn white_frame(width: u32, height: u32) -> CapturedFrame {
        CapturedFrame::new(vec![255; (width * height * 4) as usize], width, height)
    }

    async fn harness(
        config: AppConfig,
        frame: CapturedFrame,
        engine: Box<dyn RecognitionEngine>,
    ) -> Harness {
        let frame_reads = Arc::new(AtomicUsize::new(0));
        let mut source = CountingSource {
            inner: StillFrameSource::new(frame),
            reads: frame_reads.clone(),
        };
        source.start().unwrap();

        let state = Arc::new(RwLock::new(SharedScanState::new(config)));
        {
            let mut s = state.write();
            s.runtime.streaming = true;
            s.runtime.scanning = true;
        }

        let emitter = Arc::new(EventEmitter::new());
        let events = emitter.subscribe();
        let source: SharedSource = Arc::new(Mutex::new(Box::new(source)));
        let orchestrator = Arc::new(Orchestrator::new(state.clone(), source, emitter).unwrap());
        orchestrator.install_engine(engine).await;

        Harness {
            orchestrator,
            state,
            frame_reads,
            events,
        }
    }

    fn confirmations(rx: &Receiver<ScanEvent>) -> Vec<(String, String)> {
        rx.try_iter()
            .filter_map(|e| match e {
                ScanEvent::ValueConfirmed { field_id, value, .. } => Some((field_id, value)),
                _ => None,
            })
            .collect()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_three_identical_reads_confirm() {
        let h = harness(
            AppConfig::default(),
            white_frame(320, 240),
            Box::new(ScriptedEngine::new(&[("O12 3", 90.0)])),
        )
        .await;

        for _ in 0..2 {
            let summary = h.orchestrator.run_once().await.unwrap();
            assert_eq!(summary.readings[0].value, "0123");
            assert_eq!(summary.readings[0].observation, Observation::Pending);
        }
        assert!(h.state.read().confirmed("pea").is_none());

        let summary = h.orchestrator.run_once().await.unwrap();
        assert!(matches!(summary.readings[0].observation, Observation::Confirmed { .. }));
        assert_eq!(h.state.read().confirmed("pea").unwrap().value, "0123");
        assert_eq!(confirmations(&h.events), vec![("pea".to_string(), "0123".to_string())]);
        assert!(!h.state.read().runtime.busy);
    }

    #[tokio::test]
    async fn test_reconfirmation_is_not_reannounced() {
        let h = harness(
            AppConfig::default(),
            white_frame(320, 240),
            Box::new(ScriptedEngine::new(&[("777", 90.0)])),
        )
        .await;

        for _ in 0..6 {
            h.orchestrator.run_once().await.unwrap();
        }
        assert_eq!(confirmations(&h.events).len(), 1);
    }

    #[tokio::test]
    async fn test_engine_configured_before_each_call() {
        let engine = ScriptedEngine::new(&[("1", 90.0)]);
        let counters = engine.counters.clone();
        let last_params = engine.last_params.clone();
        let h = harness(AppConfig::default(), white_frame(320, 240), Box::new(engine)).await;

        h.orchestrator.run_once().await.unwrap();
        h.orchestrator.run_once().await.unwrap();

        assert_eq!(counters.configure.load(Ordering::SeqCst), 2);
        assert_eq!(counters.recognize.load(Ordering::SeqCst), 2);
        let params = last_params.lock().clone().unwrap();
        assert_eq!(params.whitelist, "0123456789OIl|");
    }

    #[tokio::test]
    async fn test_tick_while_busy_is_dropped() {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = GatedEngine {
            gate: gate.clone(),
            calls: calls.clone(),
        };
        let h = harness(AppConfig::default(), white_frame(320, 240), Box::new(engine)).await;

        assert_eq!(h.orchestrator.tick(), TickOutcome::Started);
        wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
        assert!(h.state.read().runtime.busy);
        assert_eq!(h.frame_reads.load(Ordering::SeqCst), 1);

        assert_eq!(
            h.orchestrator.tick(),
            TickOutcome::Skipped(SkipReason::Busy)
        );
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.frame_reads.load(Ordering::SeqCst), 1);

        gate.notify_one();
        let state = h.state.clone();
        wait_until(move || !state.read().runtime.busy).await;
        assert_eq!(h.orchestrator.tick(), TickOutcome::Started);
    }

    #[tokio::test]
    async fn test_inactive_pipeline_does_nothing() {
        let engine = ScriptedEngine::new(&[("1", 90.0)]);
        let counters = engine.counters.clone();
        let h = harness(AppConfig::default(), white_frame(320, 240), Box::new(engine)).await;
        h.state.write().runtime.scanning = false;

        assert_eq!(
            h.orchestrator.tick(),
            TickOutcome::Skipped(SkipReason::Inactive)
        );

        h.state.write().runtime.streaming = false;
        assert_eq!(h.orchestrator.run_once().await.unwrap_err(), SkipReason::Inactive);
        assert_eq!(counters.recognize.load(Ordering::SeqCst), 0);
        assert_eq!(h.frame_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_read_works_with_scanning_off() {
        let h = harness(
            AppConfig::default(),
            white_frame(320, 240),
            Box::new(ScriptedEngine::new(&[("PEA 0l9", 75.0)])),
        )
        .await;
        h.state.write().runtime.scanning = false;

        let summary = h.orchestrator.run_once().await.unwrap();
        assert_eq!(summary.pass, 1);
        assert_eq!(summary.readings[0].raw, "PEA 0l9");
        assert_eq!(summary.readings[0].value, "019");
        assert_eq!(summary.readings[0].confidence, 75.0);
        assert!(!h.state.read().runtime.busy);
    }

    #[tokio::test]
    async fn test_engine_failure_releases_busy() {
        let h = harness(
            AppConfig::default(),
            white_frame(320, 240),
            Box::new(ScriptedEngine::failing()),
        )
        .await;

        let summary = h.orchestrator.run_once().await.unwrap();
        assert_eq!(summary.failures, 1);
        assert!(summary.readings.is_empty());
        assert!(!h.state.read().runtime.busy);

        let failed = h
            .events
            .try_iter()
            .any(|e| matches!(e, ScanEvent::FieldFailed { .. }));
        assert!(failed);
    }

    #[tokio::test]
    async fn test_failing_field_does_not_disturb_others() {
        let mut config = AppConfig::default();
        let mut meter = FieldConfig {
            id: "meter".to_string(),
            name: "Meter reading".to_string(),
            ..Default::default()
        };
        meter.band.center_y_frac = 0.8;
        meter.band.height_frac = 0.1;
        config.fields.push(meter);

        let ok = |text: &str| -> Result<RecognitionResult, String> {
            Ok(RecognitionResult {
                text: text.to_string(),
                confidence: 85.0,
            })
        };
        let crash = || -> Result<RecognitionResult, String> { Err("engine crashed".to_string()) };
        // pea fails on every pass, meter reads fine
        let engine = ScriptedEngine::from_reads(vec![
            crash(),
            ok("456"),
            crash(),
            ok("456"),
            crash(),
            ok("456"),
        ]);
        let h = harness(config, white_frame(320, 240), Box::new(engine)).await;
        {
            let mut s = h.state.write();
            s.stability.set_manual("pea", "999");
            s.stability.observe("pea", "111", 90.0);
        }

        for pass in 1..=3 {
            let summary = h.orchestrator.run_once().await.unwrap();
            assert_eq!(summary.failures, 1);
            assert_eq!(summary.readings.len(), 1);
            assert_eq!(summary.readings[0].field_id, "meter");
            assert_eq!(summary.readings[0].value, "456");
            if pass < 3 {
                assert!(h.state.read().confirmed("meter").is_none());
            }
        }

        let events: Vec<_> = h.events.try_iter().collect();
        let failed = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::FieldFailed { field_id, .. } if field_id == "pea"))
            .count();
        assert_eq!(failed, 3);
        assert!(events.iter().any(|e| matches!(
            e,
            ScanEvent::ValueConfirmed { field_id, value, .. } if field_id == "meter" && value == "456"
        )));

        let state = h.state.read();
        assert_eq!(state.confirmed("meter").unwrap().value, "456");
        let pea = state.confirmed("pea").unwrap();
        assert_eq!(pea.value, "999");
        assert!(pea.manual);
        let window: Vec<_> = state.stability.window("pea").unwrap().entries().collect();
        assert_eq!(window, vec!["111"]);
        assert!(!state.runtime.busy);
    }

    #[tokio::test]
    async fn test_zero_sized_frame_skips_silently() {
        let engine = ScriptedEngine::new(&[("1", 90.0)]);
        let counters = engine.counters.clone();
        let h = harness(
            AppConfig::default(),
            CapturedFrame::new(Vec::new(), 0, 0),
            Box::new(engine),
        )
        .await;

        assert_eq!(h.orchestrator.run_once().await.unwrap_err(), SkipReason::NoRegion);
        assert!(!h.state.read().runtime.busy);
        assert_eq!(counters.recognize.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fields_are_read_in_order() {
        let mut config = AppConfig::default();
        let mut meter = FieldConfig {
            id: "meter".to_string(),
            name: "Meter reading".to_string(),
            ..Default::default()
        };
        meter.band.center_y_frac = 0.8;
        meter.band.height_frac = 0.1;
        config.fields.push(meter);

        let engine = ScriptedEngine::new(&[("PEA 123", 80.0), ("0456", 80.0), ("PEA 123", 80.0), ("0456", 80.0)]);
        let h = harness(config, white_frame(320, 240), Box::new(engine)).await;

        let first = h.orchestrator.run_once().await.unwrap();
        let ids: Vec<_> = first.readings.iter().map(|r| r.field_id.as_str()).collect();
        assert_eq!(ids, vec!["pea", "meter"]);
        assert_eq!(first.readings[0].value, "123");
        assert_eq!(first.readings[1].value, "0456");

        let second = h.orchestrator.run_once().await.unwrap();
        assert_eq!(second.readings[1].value, "0456");
    }

    #[tokio::test]
    async fn test_dispose_engine_once() {
        let engine = ScriptedEngine::new(&[("1", 90.0)]);
        let counters = engine.counters.clone();
        let h = harness(AppConfig::default(), white_frame(64, 64), Box::new(engine)).await;

        assert!(h.orchestrator.dispose_engine().await);
        assert!(!h.orchestrator.dispose_engine().await);
        assert_eq!(counters.dispose.load(Ordering::SeqCst), 1);
        assert!(!h.state.read().runtime.recognition_ready);
        assert_eq!(h.orchestrator.run_once().await.unwrap_err(), SkipReason::Inactive);
    }

    #[tokio::test]
    async fn test_debug_rasters_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.general.debug_dir = Some(dir.path().join("rasters"));

        let h = harness(
            config,
            white_frame(320, 240),
            Box::new(ScriptedEngine::new(&[("5", 90.0)])),
        )
        .await;
        let summary = h.orchestrator.run_once().await.unwrap();

        let expected = dir.path().join("rasters").join(format!("pea-{}.png", summary.pass));
        assert!(expected.exists());
    }
}
