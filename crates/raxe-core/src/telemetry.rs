//! Observer interface for pipeline events.
//!
//! The pipeline emits events through [`ScanEventSink`]; telemetry shipping,
//! SIEM routing, and history stores live outside the core and implement the
//! sink. Events carry hashes and counts, never scanned text.

use std::sync::Mutex;

/// Lifecycle events for one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started {
        scan_id: String,
        text_hash: String,
    },
    LayerCompleted {
        scan_id: String,
        layer: &'static str,
        duration_ms: f64,
        detections: usize,
    },
    LayerTimedOut {
        scan_id: String,
        layer: &'static str,
        budget_ms: u64,
    },
    L2Cancelled {
        scan_id: String,
    },
    Completed {
        scan_id: String,
        has_threats: bool,
        total_duration_ms: f64,
    },
}

pub trait ScanEventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Default sink: drops everything.
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl ScanEventSink for NoopEventSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Buffering sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

impl ScanEventSink for MemoryEventSink {
    fn emit(&self, event: ScanEvent) {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push(event);
    }
}
