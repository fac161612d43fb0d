//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events with fixed severities
//! - Query counters
//!
//! Observability is read-only: nothing here influences reconciliation or
//! delivery, and a failed log write is ignored.
//!
//! ```ignore
//! use aeroquery::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::QueryConverged, &[("rows", "10")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, QueryMetrics};

/// Log a lifecycle event at its fixed severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields at its fixed severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
