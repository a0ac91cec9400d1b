//! Event normalizer.
//!
//! Adapts raw session callbacks into canonical [`SessionEvent`]s. Each
//! callback yields at most one event; nothing is filtered or reordered here.
//! A callback that cannot be decoded is logged, counted, and dropped: the
//! snapshot carried by the next event brings the local view back in line.
//!
//! Every normalized event is stamped with its arrival number and carries the
//! session's own sequence number when the session supplies one.

use crate::errors::DecodeError;
use crate::observability::metrics;
use common::types::{Origin, ParticipantId, StreamKey, StreamRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// A session callback as delivered, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCallback {
    /// Callback name (`connected`, `stream_published`, ...).
    pub name: String,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub stream_key: Option<String>,
    /// Session-assigned sequence number, when the session provides one.
    #[serde(default)]
    pub sequence: Option<u64>,
    /// Full room state at call time.
    #[serde(default)]
    pub state: serde_json::Value,
}

impl RawCallback {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participant_id: None,
            stream_key: None,
            sequence: None,
            state: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn participant(mut self, participant_id: impl Into<String>) -> Self {
        self.participant_id = Some(participant_id.into());
        self
    }

    #[must_use]
    pub fn stream(mut self, participant_id: impl Into<String>, stream_key: impl Into<String>) -> Self {
        self.participant_id = Some(participant_id.into());
        self.stream_key = Some(stream_key.into());
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn state(mut self, state: serde_json::Value) -> Self {
        self.state = state;
        self
    }
}

/// What a published stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
    #[default]
    Combined,
}

/// A participant as reported in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub participant_id: ParticipantId,
    pub origin: Origin,
    /// Caller-supplied metadata, passed through untouched.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// A published stream as reported in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub participant_id: ParticipantId,
    pub key: StreamKey,
    #[serde(default)]
    pub kind: StreamKind,
    #[serde(default)]
    pub audio_track_id: Option<String>,
    #[serde(default)]
    pub video_track_id: Option<String>,
}

impl StreamSnapshot {
    #[must_use]
    pub fn stream_ref(&self) -> StreamRef {
        StreamRef {
            participant_id: self.participant_id.clone(),
            stream_key: self.key.clone(),
        }
    }
}

/// Full room state carried by a callback.
///
/// `participants` and `streams` are accepted either as arrays or as objects
/// keyed by id (the shape a serialized map takes). Both are required: a
/// snapshot missing either list is malformed rather than empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    #[serde(default)]
    pub local_participant_id: Option<ParticipantId>,
    #[serde(deserialize_with = "seq_or_map")]
    pub participants: Vec<ParticipantSnapshot>,
    #[serde(deserialize_with = "seq_or_map")]
    pub streams: Vec<StreamSnapshot>,
}

impl RoomSnapshot {
    /// Look up a participant by id.
    #[must_use]
    pub fn participant(&self, participant_id: &ParticipantId) -> Option<&ParticipantSnapshot> {
        self.participants
            .iter()
            .find(|p| &p.participant_id == participant_id)
    }
}

fn seq_or_map<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeqOrMap<T> {
        Seq(Vec<T>),
        Map(BTreeMap<String, T>),
    }

    Ok(match SeqOrMap::deserialize(deserializer)? {
        SeqOrMap::Seq(items) => items,
        SeqOrMap::Map(items) => items.into_values().collect(),
    })
}

/// Canonical session event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection established; the snapshot lists everyone already present.
    Connected { snapshot: RoomSnapshot },
    ParticipantJoined {
        participant_id: ParticipantId,
        snapshot: RoomSnapshot,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
        snapshot: RoomSnapshot,
    },
    StreamPublished {
        stream: StreamRef,
        snapshot: RoomSnapshot,
    },
    StreamUnpublished {
        stream: StreamRef,
        snapshot: RoomSnapshot,
    },
    SubscriptionStarted {
        stream: StreamRef,
        snapshot: RoomSnapshot,
    },
    SubscriptionEnded {
        stream: StreamRef,
        snapshot: RoomSnapshot,
    },
    /// The session dropped out of the room.
    Disconnected,
}

impl SessionEvent {
    /// Callback name, used as a bounded metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::ParticipantJoined { .. } => "participant_joined",
            SessionEvent::ParticipantLeft { .. } => "participant_left",
            SessionEvent::StreamPublished { .. } => "stream_published",
            SessionEvent::StreamUnpublished { .. } => "stream_unpublished",
            SessionEvent::SubscriptionStarted { .. } => "subscription_started",
            SessionEvent::SubscriptionEnded { .. } => "subscription_ended",
            SessionEvent::Disconnected => "disconnected",
        }
    }

    /// Stream the event is about, for keyed events.
    #[must_use]
    pub fn stream(&self) -> Option<&StreamRef> {
        match self {
            SessionEvent::StreamPublished { stream, .. }
            | SessionEvent::StreamUnpublished { stream, .. }
            | SessionEvent::SubscriptionStarted { stream, .. }
            | SessionEvent::SubscriptionEnded { stream, .. } => Some(stream),
            _ => None,
        }
    }

    /// Snapshot carried by the event, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        match self {
            SessionEvent::Connected { snapshot }
            | SessionEvent::ParticipantJoined { snapshot, .. }
            | SessionEvent::ParticipantLeft { snapshot, .. }
            | SessionEvent::StreamPublished { snapshot, .. }
            | SessionEvent::StreamUnpublished { snapshot, .. }
            | SessionEvent::SubscriptionStarted { snapshot, .. }
            | SessionEvent::SubscriptionEnded { snapshot, .. } => Some(snapshot),
            SessionEvent::Disconnected => None,
        }
    }

    /// Decode one raw callback.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for unknown callback names, missing
    /// arguments, and snapshots that do not match the expected shape.
    pub fn decode(raw: &RawCallback) -> Result<Self, DecodeError> {
        let name = raw.name.as_str();
        match name {
            "connected" => Ok(SessionEvent::Connected {
                snapshot: decode_snapshot(raw)?,
            }),
            "participant_joined" => Ok(SessionEvent::ParticipantJoined {
                participant_id: participant_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "participant_left" => Ok(SessionEvent::ParticipantLeft {
                participant_id: participant_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "stream_published" => Ok(SessionEvent::StreamPublished {
                stream: stream_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "stream_unpublished" => Ok(SessionEvent::StreamUnpublished {
                stream: stream_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "subscription_started" => Ok(SessionEvent::SubscriptionStarted {
                stream: stream_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "subscription_ended" => Ok(SessionEvent::SubscriptionEnded {
                stream: stream_arg(raw)?,
                snapshot: decode_snapshot(raw)?,
            }),
            "disconnected" => Ok(SessionEvent::Disconnected),
            other => Err(DecodeError::UnknownCallback(other.to_string())),
        }
    }
}

fn participant_arg(raw: &RawCallback) -> Result<ParticipantId, DecodeError> {
    raw.participant_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(ParticipantId::from)
        .ok_or_else(|| DecodeError::MissingField {
            callback: raw.name.clone(),
            field: "participant_id",
        })
}

fn stream_arg(raw: &RawCallback) -> Result<StreamRef, DecodeError> {
    let participant_id = participant_arg(raw)?;
    let stream_key = raw
        .stream_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(StreamKey::from)
        .ok_or_else(|| DecodeError::MissingField {
            callback: raw.name.clone(),
            field: "stream_key",
        })?;
    Ok(StreamRef {
        participant_id,
        stream_key,
    })
}

fn decode_snapshot(raw: &RawCallback) -> Result<RoomSnapshot, DecodeError> {
    if raw.state.is_null() {
        return Err(DecodeError::MalformedSnapshot {
            callback: raw.name.clone(),
            reason: "state missing".to_string(),
        });
    }
    RoomSnapshot::deserialize(&raw.state).map_err(|e| DecodeError::MalformedSnapshot {
        callback: raw.name.clone(),
        reason: e.to_string(),
    })
}

/// A decoded event with its ordering stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    /// Position in arrival order, counting dropped callbacks.
    pub arrival: u64,
    /// Session-assigned sequence number, if any.
    pub sequence: Option<u64>,
    pub event: SessionEvent,
}

/// Stateful adapter from raw callbacks to sequenced events.
#[derive(Debug, Default)]
pub struct EventNormalizer {
    arrivals: u64,
    dropped: u64,
}

impl EventNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one callback, or drop it if it cannot be decoded.
    pub fn normalize(&mut self, raw: &RawCallback) -> Option<SequencedEvent> {
        self.arrivals += 1;

        match SessionEvent::decode(raw) {
            Ok(event) => {
                trace!(
                    target: "rs.events",
                    callback = %raw.name,
                    arrival = self.arrivals,
                    sequence = ?raw.sequence,
                    "Callback normalized"
                );
                metrics::record_event(event.name());
                Some(SequencedEvent {
                    arrival: self.arrivals,
                    sequence: raw.sequence,
                    event,
                })
            }
            Err(e) => {
                self.dropped += 1;
                warn!(
                    target: "rs.events",
                    callback = %raw.name,
                    error = %e,
                    "Dropping undecodable session callback"
                );
                metrics::record_event_dropped(e.reason());
                None
            }
        }
    }

    /// Number of callbacks seen, decodable or not.
    #[must_use]
    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    /// Number of callbacks dropped for decode errors.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
