//! Room client: startup flow and the surface a UI consumes.
//!
//! Startup runs in a fixed order and every step is fatal on failure:
//!
//! 1. Fetch a join client token over HTTP
//! 2. Initialize the session with the room id, token, caller context, and
//!    log level
//! 3. Spawn the sync actor on the session's callback channel
//! 4. Connect
//!
//! After startup nothing the session does can fail the client; errors are
//! logged and absorbed by the actor.

use crate::actors::{RoomSyncActor, RoomSyncHandle, SyncState};
use crate::config::Config;
use crate::errors::SyncError;
use crate::media::MediaHandle;
use crate::publish::{LocalPublication, MediaCapture, PublishController};
use crate::session::{CallbackSink, RoomSession, SessionConnector, SessionInit};
use crate::stream_map::{LocalStreamMap, StreamMapReceiver};
use common::join_token::fetch_join_token;
use common::secret::SecretString;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// A joined room.
pub struct RoomClient {
    room_id: String,
    session: Arc<dyn RoomSession>,
    handle: RoomSyncHandle,
    task: JoinHandle<()>,
    streams: StreamMapReceiver,
    publisher: Arc<PublishController>,
}

impl RoomClient {
    /// Fetch a join token and start the room.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TokenAcquisition`] when the token request fails
    /// and [`SyncError::SessionStart`] when the session cannot be
    /// initialized or connected.
    #[instrument(skip_all, name = "rs.client.start", fields(room_id = %config.room_id))]
    pub async fn start(
        config: &Config,
        connector: &dyn SessionConnector,
        capture: Arc<dyn MediaCapture>,
    ) -> Result<Self, SyncError> {
        let token = fetch_join_token(&config.join_token_config())
            .await
            .map_err(|e| {
                error!(target: "rs.client", error = %e, "Join token acquisition failed");
                SyncError::TokenAcquisition(e.to_string())
            })?;

        info!(
            target: "rs.client",
            expires_at = ?token.token_expires_at,
            "Join token acquired"
        );

        Self::start_with_token(config, token.token, connector, capture).await
    }

    /// Start the room with an already minted client token.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionStart`] when the session cannot be
    /// initialized or connected.
    pub async fn start_with_token(
        config: &Config,
        client_token: SecretString,
        connector: &dyn SessionConnector,
        capture: Arc<dyn MediaCapture>,
    ) -> Result<Self, SyncError> {
        let (sink, callbacks) = CallbackSink::channel(config.callback_buffer);

        let session = connector
            .initialize(SessionInit::from_config(config, client_token), sink)
            .await
            .map_err(|e| {
                error!(target: "rs.client", error = %e, "Session initialization failed");
                SyncError::SessionStart(e.to_string())
            })?;

        let map = LocalStreamMap::new();
        let streams = map.subscribe();
        let publisher = Arc::new(PublishController::new(Arc::clone(&session), capture));

        let (handle, task) = RoomSyncActor::spawn(
            config.room_id.clone(),
            Arc::clone(&session),
            callbacks,
            map,
            Some(Arc::clone(&publisher)),
            config.subscribe_kinds,
            CancellationToken::new(),
        );

        if let Err(e) = session.connect().await {
            error!(target: "rs.client", error = %e, "Session connect failed");
            handle.cancel();
            return Err(SyncError::SessionStart(e.to_string()));
        }

        info!(
            target: "rs.client",
            room_id = %config.room_id,
            subscribe_kinds = %config.subscribe_kinds,
            "Room session connected"
        );

        Ok(Self {
            room_id: config.room_id.clone(),
            session,
            handle,
            task,
            streams,
            publisher,
        })
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Observer of the remote stream map.
    #[must_use]
    pub fn streams(&self) -> StreamMapReceiver {
        self.streams.clone()
    }

    /// Observer of the local publication.
    #[must_use]
    pub fn local_stream(&self) -> watch::Receiver<Option<LocalPublication>> {
        self.publisher.local_stream()
    }

    /// Publish the local camera and microphone.
    ///
    /// # Errors
    ///
    /// Returns the capture or session error when publishing did not start.
    /// The remote pipeline is unaffected either way.
    pub async fn publish(&self) -> Result<MediaHandle, SyncError> {
        self.publisher.publish().await
    }

    /// Diagnostic state of the synchronizer.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] when the sync actor has exited.
    pub async fn state(&self) -> Result<SyncState, SyncError> {
        self.handle.state().await
    }

    /// Leave the room and stop the sync actor.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Internal`] when the actor task panicked.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        self.publisher.end();

        if let Err(e) = self.session.disconnect().await {
            warn!(target: "rs.client", error = %e, "Session disconnect failed");
        }

        self.handle.cancel();
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("sync actor task failed: {e}")))?;

        info!(target: "rs.client", room_id = %self.room_id, "Room client shut down");
        Ok(())
    }
}
