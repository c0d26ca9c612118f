//! Temporal stabilization of per-field readings
//!
//! A reading is confirmed only once the field's sliding window is full and
//! every entry is identical, optionally gated by a confidence floor. Empty
//! reads are skipped entirely, and a confirmed value survives later bad reads
//! until a new consensus overwrites it.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Stability filter settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityConfig {
    /// Number of identical consecutive reads required
    pub capacity: usize,
    /// Minimum confidence (0-100) for confirmation; None disables gating
    pub min_confidence: Option<f32>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            min_confidence: None,
        }
    }
}

impl StabilityConfig {
    /// Build from the persisted scan settings
    pub fn from_settings(settings: &crate::config::ScanSettings) -> Self {
        Self {
            capacity: settings.history_capacity,
            min_confidence: settings.min_confidence,
        }
    }
}

/// An accepted field value
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedValue {
    /// Normalized value
    pub value: String,
    /// Confidence of the read that completed the consensus
    pub confidence: f32,
    /// When the value was (re)confirmed
    pub confirmed_at: Instant,
    /// Entered by the user rather than read
    pub manual: bool,
}

/// Bounded most-recent-N reading history
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entries: VecDeque<String>,
    capacity: usize,
}

impl HistoryWindow {
    /// Create an empty window
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest beyond capacity
    pub fn push(&mut self, value: String) {
        self.entries.push_back(value);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Window is at capacity
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// All entries are identical (true for an empty window)
    pub fn is_homogeneous(&self) -> bool {
        match self.entries.front() {
            Some(first) => self.entries.iter().all(|v| v == first),
            None => true,
        }
    }

    /// Current entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Outcome of one observation
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Empty read, window untouched
    Ignored,
    /// Appended, no consensus yet
    Pending,
    /// Consensus reached but confidence below the floor
    LowConfidence,
    /// Consensus reached; the confirmed value was (re)written
    Confirmed {
        value: ConfirmedValue,
        previous: Option<String>,
    },
}

/// Sliding-window consensus detector over all fields
#[derive(Debug, Default)]
pub struct StabilityFilter {
    config: StabilityConfig,
    windows: HashMap<String, HistoryWindow>,
    confirmed: HashMap<String, ConfirmedValue>,
}

impl StabilityFilter {
    /// Create a filter
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            confirmed: HashMap::new(),
        }
    }

    /// Feed one normalized reading
    pub fn observe(&mut self, field_id: &str, value: &str, confidence: f32) -> Observation {
        if value.is_empty() {
            return Observation::Ignored;
        }

        let capacity = self.config.capacity;
        let window = self
            .windows
            .entry(field_id.to_string())
            .or_insert_with(|| HistoryWindow::new(capacity));
        window.push(value.to_string());

        if !window.is_full() || !window.is_homogeneous() {
            return Observation::Pending;
        }

        if let Some(floor) = self.config.min_confidence {
            if confidence < floor {
                return Observation::LowConfidence;
            }
        }

        let confirmed = ConfirmedValue {
            value: value.to_string(),
            confidence,
            confirmed_at: Instant::now(),
            manual: false,
        };
        let previous = self
            .confirmed
            .insert(field_id.to_string(), confirmed.clone())
            .map(|c| c.value);

        Observation::Confirmed {
            value: confirmed,
            previous,
        }
    }

    /// Current confirmed value of a field
    pub fn confirmed(&self, field_id: &str) -> Option<&ConfirmedValue> {
        self.confirmed.get(field_id)
    }

    /// History window of a field
    pub fn window(&self, field_id: &str) -> Option<&HistoryWindow> {
        self.windows.get(field_id)
    }

    /// Install a value typed by the user; returns the replaced value
    pub fn set_manual(&mut self, field_id: &str, value: &str) -> Option<String> {
        let confirmed = ConfirmedValue {
            value: value.to_string(),
            confidence: 100.0,
            confirmed_at: Instant::now(),
            manual: true,
        };
        self.confirmed
            .insert(field_id.to_string(), confirmed)
            .map(|c| c.value)
    }

    /// Forget a field's history (the confirmed value is kept)
    pub fn reset(&mut self, field_id: &str) {
        if let Some(window) = self.windows.get_mut(field_id) {
            window.clear();
        }
    }
}
