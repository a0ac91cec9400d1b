//! Room state store.
//!
//! Holds the participants and published streams as last reported by the
//! session. The session is the source of truth: every snapshot-bearing event
//! replaces the stored view wholesale instead of applying deltas. The keyed
//! argument of an event wins over a snapshot that disagrees with it, so a
//! `stream_published` always leaves its stream present and a
//! `stream_unpublished` always leaves it absent.
//!
//! On `Connected` the store also returns catch-up intents: one per imported
//! stream that does not belong to the local participant.

use crate::events::{RoomSnapshot, SessionEvent, StreamKind};
use common::types::{Origin, ParticipantId, StreamRef};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A participant known to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    pub participant_id: ParticipantId,
    pub origin: Origin,
    pub context: Option<serde_json::Value>,
}

/// A stream known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedStream {
    pub kind: StreamKind,
}

/// Authoritative local copy of the room snapshot.
#[derive(Debug, Default)]
pub struct RoomStateStore {
    local_participant_id: Option<ParticipantId>,
    participants: BTreeMap<ParticipantId, ParticipantRecord>,
    streams: BTreeMap<StreamRef, PublishedStream>,
}

impl RoomStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the catch-up subscribe intents it implies.
    ///
    /// Only `Connected` yields intents.
    pub fn apply(&mut self, event: &SessionEvent) -> Vec<StreamRef> {
        match event {
            SessionEvent::Connected { snapshot } => {
                self.import(snapshot);
                let intents: Vec<StreamRef> = self
                    .streams
                    .keys()
                    .filter(|stream| !self.is_local(&stream.participant_id))
                    .cloned()
                    .collect();
                info!(
                    target: "rs.store",
                    participants = self.participants.len(),
                    streams = self.streams.len(),
                    catch_up = intents.len(),
                    "Imported room state"
                );
                intents
            }
            SessionEvent::ParticipantJoined { snapshot, .. }
            | SessionEvent::SubscriptionStarted { snapshot, .. }
            | SessionEvent::SubscriptionEnded { snapshot, .. } => {
                self.import(snapshot);
                Vec::new()
            }
            SessionEvent::ParticipantLeft {
                participant_id,
                snapshot,
            } => {
                self.import(snapshot);
                self.participants.remove(participant_id);
                self.streams
                    .retain(|stream, _| &stream.participant_id != participant_id);
                Vec::new()
            }
            SessionEvent::StreamPublished { stream, snapshot } => {
                self.import(snapshot);
                self.streams
                    .entry(stream.clone())
                    .or_insert(PublishedStream {
                        kind: StreamKind::default(),
                    });
                Vec::new()
            }
            SessionEvent::StreamUnpublished { stream, snapshot } => {
                self.import(snapshot);
                self.streams.remove(stream);
                Vec::new()
            }
            SessionEvent::Disconnected => {
                self.clear();
                Vec::new()
            }
        }
    }

    fn import(&mut self, snapshot: &RoomSnapshot) {
        if let Some(local) = &snapshot.local_participant_id {
            self.local_participant_id = Some(local.clone());
        }

        self.participants = snapshot
            .participants
            .iter()
            .map(|p| {
                (
                    p.participant_id.clone(),
                    ParticipantRecord {
                        participant_id: p.participant_id.clone(),
                        origin: p.origin,
                        context: p.context.clone(),
                    },
                )
            })
            .collect();

        if self.local_participant_id.is_none() {
            self.local_participant_id = self
                .participants
                .values()
                .find(|p| p.origin == Origin::Local)
                .map(|p| p.participant_id.clone());
        }

        self.streams = snapshot
            .streams
            .iter()
            .map(|s| (s.stream_ref(), PublishedStream { kind: s.kind }))
            .collect();

        debug!(
            target: "rs.store",
            participants = self.participants.len(),
            streams = self.streams.len(),
            "Snapshot applied"
        );
    }

    /// Drop everything, including the local identity.
    pub fn clear(&mut self) {
        self.local_participant_id = None;
        self.participants.clear();
        self.streams.clear();
    }

    /// Record the local identity reported out of band by the session.
    pub fn set_local_participant(&mut self, participant_id: ParticipantId) {
        self.local_participant_id = Some(participant_id);
    }

    #[must_use]
    pub fn local_participant_id(&self) -> Option<&ParticipantId> {
        self.local_participant_id.as_ref()
    }

    /// Origin of a participant.
    ///
    /// Participants missing from the snapshot are remote unless their id is
    /// the session-reported local id.
    #[must_use]
    pub fn origin_of(&self, participant_id: &ParticipantId) -> Origin {
        if self.local_participant_id.as_ref() == Some(participant_id) {
            return Origin::Local;
        }
        self.participants
            .get(participant_id)
            .map_or(Origin::Remote, |p| p.origin)
    }

    #[must_use]
    pub fn is_local(&self, participant_id: &ParticipantId) -> bool {
        self.origin_of(participant_id) == Origin::Local
    }

    #[must_use]
    pub fn participant(&self, participant_id: &ParticipantId) -> Option<&ParticipantRecord> {
        self.participants.get(participant_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.participants.values()
    }

    #[must_use]
    pub fn stream(&self, stream: &StreamRef) -> Option<&PublishedStream> {
        self.streams.get(stream)
    }

    #[must_use]
    pub fn contains_stream(&self, stream: &StreamRef) -> bool {
        self.streams.contains_key(stream)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamRef> {
        self.streams.keys()
    }
}
