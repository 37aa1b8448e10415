//! Test utilities.
//!
//! Monitors that capture what a system reports, for assertions in unit and
//! integration tests. Transport fakes live in `transport::mock`.

use std::sync::{Mutex, PoisonError};

use crate::logging::{EventMonitor, LogEvent, Severity};

/// Monitor that records every event it receives.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages received at exactly `severity`.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.message)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventMonitor for RecordingMonitor {
    fn on_log(&self, event: &LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
