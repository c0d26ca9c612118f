//! digit-scanner - continuous camera digit reader
//!
//! Replays frames from a source, reads fixed screen bands with an OCR engine
//! and only reports a value once several consecutive passes agree.

mod analysis;
mod capture;
mod config;
mod scanner;
mod shared;
mod sink;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::analysis::stability::Observation;
use crate::analysis::{ScanEvent, SkipReason};
use crate::capture::{CaptureConfig, ImageSequenceSource};
use crate::config::AppConfig;
use crate::scanner::{PassSummary, ScanSession};
use crate::shared::messages::{spawn_stdin_reader, COMMAND_HELP};
use crate::shared::SessionCommand;
use crate::sink::{ResultSink, SinkError, WebhookSink};
use crate::vision::roi::{render_overlay, RoiCalculator};
use crate::vision::{RecognitionEngine, TesseractEngine};

/// digit-scanner - read digits from a video source
#[derive(Parser, Debug)]
#[command(name = "digit-scanner")]
#[command(about = "Continuously reads digit fields from camera frames and confirms stable values")]
struct Args {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image file or directory of frames to scan
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Frame replay rate
    #[arg(long)]
    fps: Option<u32>,

    /// Stop on the last frame instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Milliseconds between recognition passes
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Identical consecutive reads required to confirm a value
    #[arg(long)]
    window: Option<usize>,

    /// Minimum confidence (0-100) for confirmation
    #[arg(long, conflicts_with = "no_confidence_gate")]
    min_confidence: Option<f32>,

    /// Confirm on agreement alone, ignoring confidence
    #[arg(long)]
    no_confidence_gate: bool,

    /// Path to the tesseract executable
    #[arg(long)]
    tesseract: Option<PathBuf>,

    /// Write every conditioned raster to this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Endpoint confirmed values are submitted to
    #[arg(long)]
    endpoint: Option<String>,

    /// Submit every newly confirmed value
    #[arg(long)]
    auto_submit: bool,

    /// Exit once every field has a confirmed value
    #[arg(long)]
    until_confirmed: bool,

    /// Read commands (camera, scan, read, send, set, reset, status, quit) from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Read the first frame once, print every field and exit
    #[arg(long, conflicts_with = "interactive")]
    read_once: bool,

    /// Log filter (overrides the configured level; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the field regions for a WxH frame and exit
    #[arg(long, value_name = "WxH")]
    list_regions: Option<String>,

    /// Draw the field regions onto the first frame, save it as PNG and exit
    #[arg(long, value_name = "PNG")]
    overlay: Option<PathBuf>,

    /// Submit a value to the configured endpoint and exit
    #[arg(long, value_name = "VALUE")]
    submit: Option<String>,

    /// Write the effective configuration to a file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration
    fn apply(&self, config: &mut AppConfig) {
        if let Some(frames) = &self.frames {
            config.capture.source = Some(frames.clone());
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if self.no_loop {
            config.capture.loop_frames = false;
        }
        if let Some(interval) = self.interval_ms {
            config.scan.interval_ms = interval;
        }
        if let Some(window) = self.window {
            config.scan.history_capacity = window;
        }
        if let Some(floor) = self.min_confidence {
            config.scan.min_confidence = Some(floor);
        }
        if self.no_confidence_gate {
            config.scan.min_confidence = None;
        }
        if let Some(path) = &self.tesseract {
            config.engine.tesseract_path = path.clone();
        }
        if let Some(dir) = &self.debug_dir {
            config.general.debug_dir = Some(dir.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.sink.endpoint = Some(endpoint.clone());
        }
        if self.auto_submit {
            config.sink.auto_submit = true;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_path) = load_or_create_config(args.config.as_deref())?;
    args.apply(&mut config);

    init_logging(&config.general.log_level)?;
    match &config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }
    config.validate().context("Invalid configuration")?;

    if let Some(path) = &args.write_config {
        config::save_config(&config, path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if let Some(dims) = &args.list_regions {
        let (width, height) = parse_dimensions(dims)?;
        list_regions(&config, width, height);
        return Ok(());
    }

    if let Some(value) = &args.submit {
        let sink = WebhookSink::new(&config.sink)?;
        let receipt = sink.submit(value).await?;
        println!("Sent {} (HTTP {})", receipt.value, receipt.status);
        return Ok(());
    }

    info!("digit-scanner starting...");
    run_scanner(config, &args).await?;
    info!("digit-scanner shutdown complete");

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level {:?}", level))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load configuration from the given file, the default location, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        return Ok((config, Some(path.to_path_buf())));
    }

    if let Ok(path) = storage::default_config_path() {
        if path.exists() {
            let config = config::load_config(&path)?;
            return Ok((config, Some(path)));
        }
    }

    Ok((AppConfig::default(), None))
}

/// Parse "WIDTHxHEIGHT"
fn parse_dimensions(text: &str) -> Result<(u32, u32)> {
    let (w, h) = text
        .trim()
        .split_once(['x', 'X'])
        .with_context(|| format!("Expected WIDTHxHEIGHT, got {:?}", text))?;
    let width = w.trim().parse().with_context(|| format!("Invalid width {:?}", w))?;
    let height = h.trim().parse().with_context(|| format!("Invalid height {:?}", h))?;
    Ok((width, height))
}

fn list_regions(config: &AppConfig, width: u32, height: u32) {
    let calculator = RoiCalculator::new(&config.fields);
    match calculator.compute(width, height) {
        Some(regions) => {
            println!("Field regions for {}x{}:", width, height);
            for region in regions {
                let r = region.rect;
                println!(
                    "  [{}] x={} y={} w={} h={}",
                    region.field_id, r.x, r.y, r.w, r.h
                );
            }
        }
        None => println!("No region available for {}x{}", width, height),
    }
}

async fn run_scanner(config: AppConfig, args: &Args) -> Result<()> {
    let capture =
        CaptureConfig::from_settings(&config.capture).context("Use --frames or capture.source")?;

    let sink = match WebhookSink::new(&config.sink) {
        Ok(sink) => Some(sink),
        Err(SinkError::NotConfigured) => None,
        Err(e) => return Err(e.into()),
    };
    let auto_submit = config.sink.auto_submit;
    if auto_submit && sink.is_none() {
        warn!("Auto-submit is on but no endpoint is configured");
    }
    let default_field = config
        .fields
        .first()
        .map(|f| f.id.clone())
        .context("No fields configured")?;
    let engine_settings = config.engine.clone();

    let mut session = ScanSession::new(config, Box::new(ImageSequenceSource::new(capture)))?;
    let events = session.subscribe();

    session
        .start_camera()
        .context("Frame source failed to start")?;

    if let Some(path) = &args.overlay {
        let written = write_overlay(&session, path);
        session.teardown().await;
        written?;
        println!("Region overlay written to {}", path.display());
        return Ok(());
    }

    let engine = TesseractEngine::start(&engine_settings)
        .await
        .map(|e| Box::new(e) as Box<dyn RecognitionEngine>);
    if let Err(e) = session.attach_engine(engine).await {
        session.teardown().await;
        return Err(e).context("Recognition is unavailable");
    }

    if args.read_once {
        let outcome = session.read_once().await;
        session.teardown().await;
        match outcome {
            Ok(summary) => print_pass(&summary),
            Err(reason) => println!("Nothing read: {}", describe_skip(reason)),
        }
        return Ok(());
    }

    if !session.start_scanning() {
        let pipeline = session.pipeline();
        warn!(
            "Scanning did not start (camera: {}, engine ready: {})",
            on_off(pipeline.streaming),
            pipeline.recognition_ready
        );
    }
    let commands = args.interactive.then(spawn_stdin_reader);
    if args.interactive {
        println!("Commands: {}", COMMAND_HELP);
    }

    let mut stats = RunStats::default();
    let mut poll = tokio::time::interval(Duration::from_millis(50));
    let mut running = true;
    while running {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                running = false;
            }
            _ = poll.tick() => {
                for event in events.try_iter() {
                    stats.record(&event);
                    handle_event(event, sink.as_ref(), auto_submit).await;
                }

                if args.until_confirmed && session.state().read().all_confirmed() {
                    info!("All fields confirmed");
                    running = false;
                }

                if let Some(commands) = &commands {
                    for command in commands.try_iter() {
                        if !handle_command(&mut session, command, sink.as_ref(), &default_field).await {
                            running = false;
                            break;
                        }
                    }
                }
            }
        }
    }

    session.teardown().await;
    stats.log_summary();
    Ok(())
}

/// Pass counters collected from session events
#[derive(Debug, Default)]
struct RunStats {
    completed: usize,
    last_pass: u64,
    fields_read: usize,
    slowest_ms: u64,
    busy_skips: usize,
    other_skips: usize,
    failures: usize,
    last_failure: Option<(String, String)>,
}

impl RunStats {
    fn record(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::PassCompleted {
                pass,
                fields_read,
                elapsed_ms,
            } => {
                self.completed += 1;
                self.last_pass = *pass;
                self.fields_read += fields_read;
                self.slowest_ms = self.slowest_ms.max(*elapsed_ms);
            }
            ScanEvent::PassSkipped {
                reason: SkipReason::Busy,
            } => self.busy_skips += 1,
            ScanEvent::PassSkipped { .. } => self.other_skips += 1,
            ScanEvent::FieldFailed { field_id, error } => {
                self.failures += 1;
                self.last_failure = Some((field_id.clone(), error.clone()));
            }
            ScanEvent::ValueConfirmed { .. } | ScanEvent::SessionError { .. } => {}
        }
    }

    fn log_summary(&self) {
        info!(
            "{} pass(es) completed up to #{}, {} field read(s), slowest {} ms, {} dropped while busy, {} without a frame",
            self.completed, self.last_pass, self.fields_read, self.slowest_ms, self.busy_skips, self.other_skips
        );
        if let Some((field_id, error)) = &self.last_failure {
            warn!("{} field read(s) failed, last on {}: {}", self.failures, field_id, error);
        }
    }
}

fn print_pass(summary: &PassSummary) {
    println!(
        "Pass {} ({} ms, {} failed)",
        summary.pass,
        summary.elapsed.as_millis(),
        summary.failures
    );
    for reading in &summary.readings {
        let outcome = match reading.observation {
            Observation::Confirmed { .. } => "confirmed",
            Observation::LowConfidence => "low confidence",
            Observation::Pending => "pending",
            Observation::Ignored => "no read",
        };
        println!(
            "  [{}] {:?} -> {:?} ({:.0}, {})",
            reading.field_id, reading.raw, reading.value, reading.confidence, outcome
        );
    }
}

fn describe_skip(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Busy => "a pass is still running",
        SkipReason::Inactive => "camera off or engine not ready",
        SkipReason::NoRegion => "no frame available yet",
    }
}

fn write_overlay(session: &ScanSession, path: &Path) -> Result<()> {
    let frame = session
        .current_frame()
        .context("Frame source produced no frame")?;
    let regions = session
        .orchestrator()
        .roi()
        .compute(frame.width, frame.height)
        .context("No region available for this frame size")?;
    let canvas = render_overlay(&frame, &regions).context("Frame buffer is truncated")?;
    canvas
        .save(path)
        .with_context(|| format!("Failed to write overlay {:?}", path))?;
    Ok(())
}

async fn handle_event(event: ScanEvent, sink: Option<&WebhookSink>, auto_submit: bool) {
    match event {
        ScanEvent::ValueConfirmed {
            field_id,
            previous,
            value,
            confidence,
        } => {
            match previous {
                Some(previous) => println!("{}: {} (was {}, confidence {:.0})", field_id, value, previous, confidence),
                None => println!("{}: {} (confidence {:.0})", field_id, value, confidence),
            }
            if auto_submit {
                if let Some(sink) = sink {
                    submit(sink, &value).await;
                }
            }
        }
        ScanEvent::SessionError { message } => eprintln!("Error: {}", message),
        ScanEvent::PassCompleted { .. }
        | ScanEvent::PassSkipped { .. }
        | ScanEvent::FieldFailed { .. } => {}
    }
}

/// Returns false when the session should end
async fn handle_command(
    session: &mut ScanSession,
    command: SessionCommand,
    sink: Option<&WebhookSink>,
    default_field: &str,
) -> bool {
    match command {
        SessionCommand::ToggleCamera => match session.toggle_camera() {
            Ok(true) => println!("Camera on"),
            Ok(false) => println!("Camera off"),
            Err(_) => {}
        },
        SessionCommand::ToggleScanning => {
            if session.toggle_scanning() {
                println!("Scanning on");
            } else if session.pipeline().streaming && session.pipeline().recognition_ready {
                println!("Scanning off");
            } else {
                println!("Scanning unavailable (camera off or engine not ready)");
            }
        }
        SessionCommand::ReadOnce => match session.read_once().await {
            Ok(summary) => print_pass(&summary),
            Err(reason) => println!("Nothing read: {}", describe_skip(reason)),
        },
        SessionCommand::Submit(field) => {
            let field = field.as_deref().unwrap_or(default_field);
            match (session.confirmed(field), sink) {
                (Some(confirmed), Some(sink)) => submit(sink, &confirmed.value).await,
                (None, _) => println!("No confirmed value for {}", field),
                (Some(_), None) => println!("No endpoint configured"),
            }
        }
        SessionCommand::SetManual { field_id, value } => {
            let field = field_id.as_deref().unwrap_or(default_field);
            if let Err(e) = session.set_manual_value(field, &value) {
                println!("{}", e);
            }
        }
        SessionCommand::Reset(field) => match session.reset_history(field.as_deref()) {
            Ok(()) => println!("History cleared"),
            Err(e) => println!("{}", e),
        },
        SessionCommand::Status => print_status(session),
        SessionCommand::Quit => return false,
    }
    true
}

fn print_status(session: &ScanSession) {
    let state = session.state();
    let state = state.read();
    let runtime = &state.runtime;
    println!(
        "camera: {}  engine: {}  scanning: {}  passes: {}",
        on_off(runtime.streaming),
        if runtime.recognition_ready { "ready" } else { "unavailable" },
        on_off(runtime.scanning),
        runtime.passes
    );
    if let Some(err) = &runtime.last_error {
        println!("last error: {}", err);
    }
    for field in &state.config.fields {
        match state.confirmed(&field.id) {
            Some(c) if c.manual => println!("  {} ({}): {} [manual]", field.name, field.id, c.value),
            Some(c) => println!(
                "  {} ({}): {} [{:.0}, {}s ago]",
                field.name,
                field.id,
                c.value,
                c.confidence,
                c.confirmed_at.elapsed().as_secs()
            ),
            None => println!("  {} ({}): -", field.name, field.id),
        }
        if let Some(window) = state.stability.window(&field.id) {
            if !window.is_empty() {
                println!(
                    "      recent {}/{}: {}",
                    window.len(),
                    state.config.scan.history_capacity,
                    window.entries().collect::<Vec<_>>().join(" ")
                );
            }
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

async fn submit(sink: &dyn ResultSink, value: &str) {
    match sink.submit(value).await {
        Ok(receipt) => {
            println!("Sent {} (HTTP {})", receipt.value, receipt.status);
            if let Some(response) = receipt.response {
                debug!("Endpoint replied {}", response);
            }
        }
        Err(e) => error!("Send failed: {}", e),
    }
}
