//! Event sinks.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives run lifecycle events.
///
/// Emission must never fail the run: implementations swallow their own
/// errors.
pub trait EventSink: Send + Sync {
    /// Emits `event_type` (`run.started`, `step.failed`, ...) with an
    /// optional JSON payload.
    fn emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Forwards events to `tracing`.
///
/// Failure events (`*.failed`) are always logged at warn level; everything
/// else at the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }
}

fn field<'a>(data: Option<&'a Value>, key: &str) -> &'a str {
    data.and_then(|d| d.get(key)).and_then(Value::as_str).unwrap_or("")
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event_type: &str, data: Option<Value>) {
        let step = field(data.as_ref(), "step");
        if event_type.ends_with(".failed") {
            warn!(event = event_type, step, data = ?data, "Run event");
        } else if self.level == Level::INFO {
            info!(event = event_type, step, "Run event");
        } else {
            debug!(event = event_type, step, data = ?data, "Run event");
        }
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.lock().clone()
    }

    /// Event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Payloads of events of exactly `event_type`.
    #[must_use]
    pub fn payloads(&self, event_type: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, d)| d.clone())
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push((event_type.to_string(), data));
    }
}
