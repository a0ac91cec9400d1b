//! Mailbox monitoring for the sync actor.
//!
//! | Actor | Normal | Warning | Critical |
//! |-------|--------|---------|----------|
//! | Sync  | < 100  | 100-500 | > 500    |
//!
//! Depth is sampled each time the actor takes a callback or message: the
//! item being received plus everything still queued behind it on the
//! callback channel and the mailbox.

use tracing::{debug, warn};

/// Mailbox depth thresholds for the sync actor.
pub const SYNC_MAILBOX_NORMAL: usize = 100;
pub const SYNC_MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub fn for_depth(depth: usize) -> Self {
        if depth > SYNC_MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > SYNC_MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Mailbox monitor for tracking queue depth.
///
/// Owned by the actor, so no interior mutability.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor identifier (room id).
    actor_id: String,
    /// Peak depth observed.
    peak_depth: usize,
    level: MailboxLevel,
    /// Total callbacks and messages received.
    messages_processed: u64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            peak_depth: 0,
            level: MailboxLevel::Normal,
            messages_processed: 0,
        }
    }

    /// Record one item taken off the queues with `queued` still waiting.
    pub fn record_receive(&mut self, queued: usize) {
        let depth = queued + 1;
        self.peak_depth = self.peak_depth.max(depth);
        self.messages_processed += 1;

        let level = MailboxLevel::for_depth(depth);
        match level {
            MailboxLevel::Critical => {
                warn!(
                    target: "rs.actor.mailbox",
                    actor_id = %self.actor_id,
                    depth,
                    threshold = SYNC_MAILBOX_WARNING,
                    "Mailbox depth critical"
                );
            }
            // Log once when crossing into the warning band
            MailboxLevel::Warning if self.level == MailboxLevel::Normal => {
                debug!(
                    target: "rs.actor.mailbox",
                    actor_id = %self.actor_id,
                    depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
        self.level = level;
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_samples_queue() {
        let mut monitor = MailboxMonitor::new("room-123");
        assert_eq!(monitor.peak_depth(), 0);

        monitor.record_receive(4);
        assert_eq!(monitor.peak_depth(), 5);

        monitor.record_receive(0);
        assert_eq!(monitor.level, MailboxLevel::Normal);
        assert_eq!(monitor.peak_depth(), 5); // Peak stays at 5
        assert_eq!(monitor.messages_processed(), 2);
    }

    #[test]
    fn test_levels() {
        let mut monitor = MailboxMonitor::new("room-123");
        assert_eq!(monitor.level, MailboxLevel::Normal);

        monitor.record_receive(150);
        assert_eq!(monitor.level, MailboxLevel::Warning);

        monitor.record_receive(600);
        assert_eq!(monitor.level, MailboxLevel::Critical);

        monitor.record_receive(0);
        assert_eq!(monitor.level, MailboxLevel::Normal);
        assert_eq!(monitor.peak_depth(), 601);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(MailboxLevel::for_depth(SYNC_MAILBOX_NORMAL), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(SYNC_MAILBOX_NORMAL + 1), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(SYNC_MAILBOX_WARNING), MailboxLevel::Warning);
        assert_eq!(MailboxLevel::for_depth(SYNC_MAILBOX_WARNING + 1), MailboxLevel::Critical);
    }
}
