//! Subscription policy engine.
//!
//! Decides which remote streams to subscribe to and keeps the local stream
//! map a pure function of the active subscriptions.
//!
//! Per stream the lifecycle is:
//!
//! ```text
//! (absent) --subscribe issued--> Pending --subscription_started--> Active
//!     ^                            |                                 |
//!     +----- subscribe failed -----+                                 |
//!                                  +------ subscription_ended -------+--> Removed
//! ```
//!
//! `Removed` is a tombstone: a late `subscription_started` for it is
//! ignored, while a fresh `stream_published` starts a new lifecycle. Streams
//! published by the local participant never enter the machine.
//!
//! The engine performs no I/O. Methods that decide to subscribe mark the
//! stream `Pending` and return a [`SubscribeRequest`]; the caller issues the
//! command and reports a failure back through
//! [`SubscriptionPolicyEngine::on_subscribe_failed`] with the request's
//! attempt number. A failure reported for an older attempt is ignored.

use crate::media::{MediaHandle, MediaKinds, RemoteStream};
use crate::observability::metrics;
use crate::store::RoomStateStore;
use crate::stream_map::{LocalStreamMap, StreamMapReceiver};
use common::types::{ParticipantId, StreamRef};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Externally visible subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Removed,
}

/// A subscribe command the caller must issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub stream: StreamRef,
    /// Identifies this lifecycle of `stream`; echoed back on failure.
    pub attempt: u64,
}

#[derive(Debug, Clone)]
enum Subscription {
    Pending { attempt: u64 },
    Active { handle: MediaHandle, started: u64 },
    Removed,
}

impl Subscription {
    fn status(&self) -> SubscriptionStatus {
        match self {
            Subscription::Pending { .. } => SubscriptionStatus::Pending,
            Subscription::Active { .. } => SubscriptionStatus::Active,
            Subscription::Removed => SubscriptionStatus::Removed,
        }
    }
}

/// Discards keyed events that arrive out of order.
///
/// Remembers the last applied session-assigned sequence number per stream
/// and only admits strictly newer ones. Entries are dropped when the stream
/// is unpublished or its participant leaves, so a republished stream starts
/// over.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    last_applied: HashMap<StreamRef, u64>,
}

impl SequenceGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `sequence` for `stream`, recording it when accepted.
    pub fn admit(&mut self, stream: &StreamRef, sequence: u64) -> bool {
        match self.last_applied.get(stream) {
            Some(&last) if sequence <= last => {
                debug!(
                    target: "rs.policy",
                    stream = %stream,
                    sequence,
                    last_applied = last,
                    "Discarding stale event"
                );
                metrics::record_event_dropped("stale");
                false
            }
            _ => {
                self.last_applied.insert(stream.clone(), sequence);
                true
            }
        }
    }

    /// Last applied sequence for a stream.
    #[must_use]
    pub fn last_applied(&self, stream: &StreamRef) -> Option<u64> {
        self.last_applied.get(stream).copied()
    }

    /// Forget the stream's history once it is unpublished.
    pub fn forget(&mut self, stream: &StreamRef) {
        self.last_applied.remove(stream);
    }

    /// Forget every stream owned by a departed participant.
    pub fn forget_participant(&mut self, participant_id: &ParticipantId) {
        self.last_applied
            .retain(|stream, _| &stream.participant_id != participant_id);
    }

    /// Forget everything (new session lifecycle).
    pub fn clear(&mut self) {
        self.last_applied.clear();
    }
}

/// Maps stream lifecycle events to subscribe commands and map updates.
#[derive(Debug)]
pub struct SubscriptionPolicyEngine {
    kinds: MediaKinds,
    subscriptions: BTreeMap<StreamRef, Subscription>,
    map: LocalStreamMap,
    /// Start counter used to pick the most recent active stream per participant.
    starts: u64,
    /// Subscribe attempt counter.
    attempts: u64,
}

impl SubscriptionPolicyEngine {
    #[must_use]
    pub fn new(kinds: MediaKinds, map: LocalStreamMap) -> Self {
        Self {
            kinds,
            subscriptions: BTreeMap::new(),
            map,
            starts: 0,
            attempts: 0,
        }
    }

    /// Media kinds requested by every subscribe command.
    #[must_use]
    pub fn kinds(&self) -> MediaKinds {
        self.kinds
    }

    /// Observer of the map this engine maintains.
    #[must_use]
    pub fn map_receiver(&self) -> StreamMapReceiver {
        self.map.subscribe()
    }

    #[must_use]
    pub fn status(&self, stream: &StreamRef) -> Option<SubscriptionStatus> {
        self.subscriptions.get(stream).map(Subscription::status)
    }

    /// All tracked subscriptions with their status.
    pub fn statuses(&self) -> impl Iterator<Item = (&StreamRef, SubscriptionStatus)> {
        self.subscriptions
            .iter()
            .map(|(stream, sub)| (stream, sub.status()))
    }

    #[must_use]
    pub fn visible(&self) -> usize {
        self.map.current().len()
    }

    /// Catch-up after connecting: request every intent the store produced.
    pub fn on_connected(
        &mut self,
        intents: &[StreamRef],
        store: &RoomStateStore,
    ) -> Vec<SubscribeRequest> {
        intents
            .iter()
            .filter_map(|stream| self.request(stream, store))
            .collect()
    }

    /// A stream was published; subscribe unless it is our own.
    pub fn on_stream_published(
        &mut self,
        stream: &StreamRef,
        store: &RoomStateStore,
    ) -> Option<SubscribeRequest> {
        self.request(stream, store)
    }

    fn request(&mut self, stream: &StreamRef, store: &RoomStateStore) -> Option<SubscribeRequest> {
        if store.is_local(&stream.participant_id) {
            debug!(target: "rs.policy", stream = %stream, "Skipping self-published stream");
            return None;
        }

        match self.subscriptions.get(stream) {
            Some(Subscription::Pending { .. } | Subscription::Active { .. }) => {
                debug!(
                    target: "rs.policy",
                    stream = %stream,
                    "Subscription already in flight"
                );
                None
            }
            Some(Subscription::Removed) | None => {
                self.attempts += 1;
                let attempt = self.attempts;
                self.subscriptions
                    .insert(stream.clone(), Subscription::Pending { attempt });
                debug!(
                    target: "rs.policy",
                    stream = %stream,
                    attempt,
                    kinds = %self.kinds,
                    "Subscription pending"
                );
                Some(SubscribeRequest {
                    stream: stream.clone(),
                    attempt,
                })
            }
        }
    }

    /// Subscribe command `attempt` for `stream` failed: leave it unsubscribed.
    ///
    /// Only the pending attempt it was issued for is reverted.
    pub fn on_subscribe_failed(&mut self, stream: &StreamRef, attempt: u64) {
        match self.subscriptions.get(stream) {
            Some(Subscription::Pending { attempt: pending }) if *pending == attempt => {
                self.subscriptions.remove(stream);
                info!(
                    target: "rs.policy",
                    stream = %stream,
                    attempt,
                    "Subscription reverted to unsubscribed"
                );
            }
            _ => {
                debug!(
                    target: "rs.policy",
                    stream = %stream,
                    attempt,
                    status = ?self.status(stream),
                    "Ignoring failure of superseded subscribe attempt"
                );
            }
        }
    }

    /// Negotiated media is available for `stream`.
    ///
    /// Accepted only for a pending subscription whose stream is still in
    /// the store, and only when the session actually has tracks for it.
    pub fn on_subscription_started(
        &mut self,
        stream: &StreamRef,
        store: &RoomStateStore,
        negotiated: Option<RemoteStream>,
    ) {
        if !matches!(self.subscriptions.get(stream), Some(Subscription::Pending { .. })) {
            debug!(
                target: "rs.policy",
                stream = %stream,
                status = ?self.status(stream),
                "Ignoring subscription start for non-pending stream"
            );
            return;
        }

        if !store.contains_stream(stream) {
            warn!(
                target: "rs.policy",
                stream = %stream,
                "Ignoring subscription start for unknown stream"
            );
            return;
        }

        let Some(remote) = negotiated else {
            warn!(
                target: "rs.policy",
                stream = %stream,
                "Session has no negotiated media for started subscription"
            );
            return;
        };

        let handle = remote.into_handle();
        self.starts += 1;
        self.subscriptions.insert(
            stream.clone(),
            Subscription::Active {
                handle: handle.clone(),
                started: self.starts,
            },
        );
        self.map.set(stream.participant_id.clone(), handle);

        info!(target: "rs.policy", stream = %stream, "Subscription active");
    }

    /// Subscription terminated by the session.
    pub fn on_subscription_ended(&mut self, stream: &StreamRef) {
        match self.subscriptions.get(stream) {
            Some(Subscription::Pending { .. } | Subscription::Active { .. }) => {
                self.subscriptions
                    .insert(stream.clone(), Subscription::Removed);
                self.refresh_participant(&stream.participant_id);
                info!(target: "rs.policy", stream = %stream, "Subscription removed");
            }
            Some(Subscription::Removed) | None => {
                debug!(
                    target: "rs.policy",
                    stream = %stream,
                    "Ignoring subscription end for inactive stream"
                );
            }
        }
    }

    /// Stream withdrawn by its publisher.
    pub fn on_stream_unpublished(&mut self, stream: &StreamRef) {
        if self.subscriptions.remove(stream).is_some() {
            self.refresh_participant(&stream.participant_id);
            debug!(target: "rs.policy", stream = %stream, "Subscription dropped");
        }
    }

    /// Participant left: drop all of its subscriptions and its map entry.
    pub fn on_participant_left(&mut self, participant_id: &ParticipantId) {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|stream, _| &stream.participant_id != participant_id);
        self.map.remove(participant_id);

        debug!(
            target: "rs.policy",
            participant_id = %participant_id,
            dropped = before - self.subscriptions.len(),
            "Participant subscriptions dropped"
        );
    }

    /// Session gone: forget every subscription and clear the map.
    pub fn on_disconnected(&mut self) {
        self.subscriptions.clear();
        self.map.clear();
        info!(target: "rs.policy", "All subscriptions cleared");
    }

    /// Drop subscriptions whose stream is no longer in the store.
    pub fn reconcile(&mut self, store: &RoomStateStore) {
        let orphaned: Vec<StreamRef> = self
            .subscriptions
            .keys()
            .filter(|stream| !store.contains_stream(stream))
            .cloned()
            .collect();

        for stream in orphaned {
            self.subscriptions.remove(&stream);
            self.refresh_participant(&stream.participant_id);
            debug!(
                target: "rs.policy",
                stream = %stream,
                "Dropped subscription for vanished stream"
            );
        }
    }

    /// Point the participant's map entry at its most recently started
    /// active stream, or remove it when none is left.
    fn refresh_participant(&mut self, participant_id: &ParticipantId) {
        let latest = self
            .subscriptions
            .iter()
            .filter(|(stream, _)| &stream.participant_id == participant_id)
            .filter_map(|(_, sub)| match sub {
                Subscription::Active { handle, started } => Some((*started, handle)),
                _ => None,
            })
            .max_by_key(|(started, _)| *started)
            .map(|(_, handle)| handle.clone());

        match latest {
            Some(handle) => {
                self.map.set(participant_id.clone(), handle);
            }
            None => {
                self.map.remove(participant_id);
            }
        }
    }
}
