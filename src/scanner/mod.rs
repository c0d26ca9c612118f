//! Scanning pipeline
//!
//! The session drives a periodic task whose ticks ask the orchestrator for a
//! recognition pass over the current frame.

pub mod orchestrator;
pub mod session;
pub mod ticker;

pub use orchestrator::PassSummary;
pub use session::ScanSession;
