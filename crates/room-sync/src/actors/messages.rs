//! Message types for the sync actor mailbox.
//!
//! Requests that need an answer carry a `tokio::sync::oneshot` sender.

use crate::errors::SessionError;
use crate::events::RawCallback;
use crate::policy::SubscriptionStatus;
use common::types::{ParticipantId, StreamRef};
use serde::Serialize;
use tokio::sync::oneshot;

/// Messages sent to `RoomSyncActor`.
#[derive(Debug)]
pub enum SyncMessage {
    /// A session callback delivered through the handle rather than the
    /// session's callback channel.
    Callback(RawCallback),

    /// Result of a spawned `add_subscription` call.
    SubscribeOutcome {
        stream: StreamRef,
        /// Attempt number the command was issued for.
        attempt: u64,
        result: Result<(), SessionError>,
    },

    /// Diagnostic state query.
    GetState {
        /// Response channel for the state snapshot.
        respond_to: oneshot::Sender<SyncState>,
    },
}

/// Diagnostic snapshot of the synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub room_id: String,
    pub local_participant_id: Option<ParticipantId>,
    pub participants: Vec<ParticipantId>,
    pub streams: Vec<StreamRef>,
    pub subscriptions: Vec<SubscriptionInfo>,
    /// Entries currently in the local stream map.
    pub visible_streams: usize,
    pub events_applied: u64,
    /// Callbacks dropped for decode errors or staleness.
    pub events_dropped: u64,
    /// Largest number of queued callbacks and messages seen on receipt.
    pub mailbox_peak_depth: usize,
}

impl SyncState {
    /// Status of one stream's subscription, if tracked.
    #[must_use]
    pub fn subscription(&self, stream: &StreamRef) -> Option<SubscriptionStatus> {
        self.subscriptions
            .iter()
            .find(|s| &s.stream == stream)
            .map(|s| s.status)
    }
}

/// One tracked subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub stream: StreamRef,
    pub status: SubscriptionStatus,
}
