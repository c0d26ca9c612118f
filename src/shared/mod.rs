//! Shared state and messaging between the session and its front end
//!
//! The scanner state is a single record behind `Arc<RwLock<..>>`; user
//! commands reach the session over a crossbeam channel.

pub mod state;
pub mod messages;

pub use state::{PipelineState, SharedScanState};
pub use messages::SessionCommand;
