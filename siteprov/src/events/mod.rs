//! Event sink system for observability.
//!
//! The orchestrator emits one event per lifecycle transition (`run.started`,
//! `step.completed`, `step.failed`, `rollback.completed`, `rollback.failed`,
//! `run.completed`, `run.rolled_back`). Sinks decide what to do with them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
