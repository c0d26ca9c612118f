//! Event system for scan progress
//!
//! Confirmed values and pass outcomes are broadcast to every subscriber over
//! crossbeam channels. Subscribers that went away are pruned on the next emit.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Why a tick did not start a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A pass is still in flight
    Busy,
    /// Scanning is off, the source is not streaming or the engine is not ready
    Inactive,
    /// No frame or no region available yet
    NoRegion,
}

/// Events emitted by the scanner
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A field reached a new consensus value
    ValueConfirmed {
        field_id: String,
        previous: Option<String>,
        value: String,
        confidence: f32,
    },
    /// A pass finished
    PassCompleted {
        pass: u64,
        fields_read: usize,
        elapsed_ms: u64,
    },
    /// A pass was skipped
    PassSkipped { reason: SkipReason },
    /// One field failed within a pass
    FieldFailed { field_id: String, error: String },
    /// A user-visible session failure
    SessionError { message: String },
}

/// Event emitter for broadcasting scan events
pub struct EventEmitter {
    subscribers: Mutex<Vec<Sender<ScanEvent>>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber; it receives every event emitted afterwards
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ScanEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
