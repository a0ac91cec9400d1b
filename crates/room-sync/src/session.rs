//! Boundary to the external media session.
//!
//! The media session owns transport, negotiation, and the tracks
//! themselves. This crate talks to it through two seams:
//!
//! - [`RoomSession`]: commands the synchronizer issues (`connect`,
//!   `add_subscription`, `add_stream`) plus lookups it needs while handling
//!   events (`participant_stream`, `local_participant_id`)
//! - [`CallbackSink`]: the channel the session pushes its callbacks into.
//!   Instead of registering one closure per event name, the session emits
//!   [`RawCallback`] values and the sync actor drains them in arrival order.
//!
//! Both traits use `async_trait` so they stay object safe behind `Arc<dyn _>`.

use crate::config::Config;
use crate::errors::SessionError;
use crate::events::RawCallback;
use crate::media::{LocalTracks, MediaKinds, RemoteStream};
use common::secret::SecretString;
use common::types::{ParticipantId, StreamKey};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Parameters handed to the session at initialization.
#[derive(Debug, Clone)]
pub struct SessionInit {
    /// Room to join.
    pub room_id: String,
    /// Join client token minted for this room.
    pub client_token: SecretString,
    /// Opaque caller context forwarded to other participants.
    pub context: String,
    /// Session log verbosity.
    pub log_level: String,
}

impl SessionInit {
    /// Build the initialization parameters from configuration and a token.
    #[must_use]
    pub fn from_config(config: &Config, client_token: SecretString) -> Self {
        Self {
            room_id: config.room_id.clone(),
            client_token,
            context: config.client_context.clone(),
            log_level: config.log_level.clone(),
        }
    }
}

/// Commands and lookups offered by a connected media session.
#[async_trait::async_trait]
pub trait RoomSession: Send + Sync {
    /// Join the room. Callbacks start flowing after this resolves.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Ask to receive a remote stream.
    async fn add_subscription(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
        kinds: MediaKinds,
    ) -> Result<(), SessionError>;

    /// Publish local tracks under the given key.
    async fn add_stream(&self, stream_key: &StreamKey, tracks: LocalTracks)
        -> Result<(), SessionError>;

    /// Negotiated tracks of a subscribed stream, if the session has them.
    fn participant_stream(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
    ) -> Option<RemoteStream>;

    /// Identity the session assigned to the local participant.
    fn local_participant_id(&self) -> Option<ParticipantId>;

    /// Leave the room.
    async fn disconnect(&self) -> Result<(), SessionError>;
}

/// Factory for sessions (one per room join).
#[async_trait::async_trait]
pub trait SessionConnector: Send + Sync {
    /// Initialize a session that will emit its callbacks into `callbacks`.
    async fn initialize(
        &self,
        init: SessionInit,
        callbacks: CallbackSink,
    ) -> Result<Arc<dyn RoomSession>, SessionError>;
}

/// Sending half of the session callback channel.
#[derive(Clone, Debug)]
pub struct CallbackSink {
    sender: mpsc::Sender<RawCallback>,
}

impl CallbackSink {
    /// Create a sink and the receiver the sync actor consumes.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RawCallback>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }

    /// Deliver one callback, waiting for mailbox capacity.
    pub async fn emit(&self, callback: RawCallback) -> Result<(), SessionError> {
        self.sender
            .send(callback)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Whether the consuming side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
