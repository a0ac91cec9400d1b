//! Metric definitions.
//!
//! All metrics carry the `rs_` prefix. Labels are bounded:
//! - `event`: closed set of callback names (8 values)
//! - `reason`: decode error kinds plus `stale` (4 values)
//! - `status`: `issued`, `success`, `error`

use metrics::{counter, gauge};

/// Record one normalized session event.
///
/// Metric: `rs_events_total`
/// Labels: `event`
pub fn record_event(event: &'static str) {
    counter!("rs_events_total", "event" => event).increment(1);
}

/// Record one dropped callback.
///
/// Metric: `rs_events_dropped_total`
/// Labels: `reason`
pub fn record_event_dropped(reason: &'static str) {
    counter!("rs_events_dropped_total", "reason" => reason).increment(1);
}

/// Record a subscribe command transition.
///
/// Metric: `rs_subscribe_commands_total`
/// Labels: `status` (issued, success, error)
pub fn record_subscribe_command(status: &'static str) {
    counter!("rs_subscribe_commands_total", "status" => status).increment(1);
}

/// Record a local publish outcome.
///
/// Metric: `rs_publish_total`
/// Labels: `status` (success, error)
pub fn record_publish(status: &'static str) {
    counter!("rs_publish_total", "status" => status).increment(1);
}

/// Set the number of entries in the local stream map.
///
/// Metric: `rs_visible_streams`
pub fn set_visible_streams(count: usize) {
    // usize to f64 conversion is safe for realistic room sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("rs_visible_streams").set(count as f64);
}
