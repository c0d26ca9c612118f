//! Analysis of recognized text over time
//!
//! Turns the noisy per-pass readings into confirmed values and broadcasts
//! what happened.

pub mod events;
pub mod stability;

pub use events::{ScanEvent, SkipReason};
