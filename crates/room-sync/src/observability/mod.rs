//! Observability for the room synchronizer.
//!
//! Instrumentation uses `tracing` with per-component targets and the
//! `metrics` facade for counters. The library never installs a recorder;
//! an embedding application decides whether and where metrics go.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rs_events_total` | Counter | `event` | Normalized session events |
//! | `rs_events_dropped_total` | Counter | `reason` | Callbacks dropped (decode errors, stale) |
//! | `rs_subscribe_commands_total` | Counter | `status` | Subscribe command outcomes |
//! | `rs_publish_total` | Counter | `status` | Local publish outcomes |
//! | `rs_visible_streams` | Gauge | none | Entries in the local stream map |

pub mod metrics;
