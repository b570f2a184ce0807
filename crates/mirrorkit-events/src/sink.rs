use std::sync::Mutex;

use crate::MirrorEvent;

/// Trait for consuming events.
///
/// Each frontend provides its own implementation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MirrorEvent);
}

/// No-op event sink for tests or headless operation.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MirrorEvent) {}
}

/// Stores all events for inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<MirrorEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: MirrorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
