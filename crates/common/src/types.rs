//! Identifier types for room participants and their published streams.
//!
//! Identifiers are opaque strings assigned by the remote session; nothing in
//! this workspace generates them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a participant within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Create a participant ID from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of a stream published by a participant (e.g. `"self"`, `"cam"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(pub String);

impl StreamKey {
    /// Create a stream key from any string-like value
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StreamKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Composite key of a published stream: `(participant, stream key)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamRef {
    /// Publishing participant
    pub participant_id: ParticipantId,
    /// Stream name within that participant
    pub stream_key: StreamKey,
}

impl StreamRef {
    /// Build a stream reference from its two parts
    #[must_use]
    pub fn new(participant_id: impl Into<ParticipantId>, stream_key: impl Into<StreamKey>) -> Self {
        Self {
            participant_id: participant_id.into(),
            stream_key: stream_key.into(),
        }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.participant_id, self.stream_key)
    }
}

/// Whether a participant is the local user or someone else in the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The participant this client connected as
    Local,
    /// Any other participant
    Remote,
}
