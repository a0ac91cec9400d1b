//! Replay session: drives the synchronizer from recorded callbacks.
//!
//! Input is newline-delimited JSON, one [`RawCallback`] per line. Every
//! command is acknowledged, and `participant_stream` is answered from the
//! most recent snapshot seen in the input. Lines that are not valid JSON
//! are logged and skipped.
//!
//! [`SyntheticCapture`] stands in for camera and microphone so the local
//! publish path can run without devices.

use crate::errors::{CaptureError, SessionError};
use crate::events::{RawCallback, RoomSnapshot};
use crate::media::{LocalMedia, LocalTracks, MediaHandle, MediaKinds, MediaTrack, RemoteStream};
use crate::publish::MediaCapture;
use crate::session::{CallbackSink, RoomSession, SessionConnector, SessionInit};
use common::types::{ParticipantId, StreamKey};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Session backed by a callback recording.
#[derive(Debug)]
pub struct ReplaySession {
    room_id: String,
    sink: CallbackSink,
    latest: RwLock<RoomSnapshot>,
}

impl ReplaySession {
    #[must_use]
    pub fn new(room_id: impl Into<String>, sink: CallbackSink) -> Self {
        Self {
            room_id: room_id.into(),
            sink,
            latest: RwLock::new(RoomSnapshot::default()),
        }
    }

    /// Feed every line of `reader` into the callback channel.
    ///
    /// Returns the number of callbacks emitted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when the synchronizer stops
    /// consuming, and [`SessionError::Unavailable`] on read errors.
    pub async fn feed<R>(&self, reader: R) -> Result<usize, SessionError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut emitted = 0;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| SessionError::Unavailable(format!("replay input: {e}")))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let raw: RawCallback = match serde_json::from_str(line) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(target: "rs.replay", error = %e, "Skipping unparseable replay line");
                    continue;
                }
            };

            self.observe(&raw);
            self.sink.emit(raw).await?;
            emitted += 1;
        }

        info!(target: "rs.replay", emitted, "Replay input exhausted");
        Ok(emitted)
    }

    /// Remember the snapshot a callback carries, if it decodes.
    fn observe(&self, raw: &RawCallback) {
        if raw.state.is_null() {
            return;
        }
        if let Ok(snapshot) = RoomSnapshot::deserialize(&raw.state) {
            *self.latest.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        }
    }
}

#[async_trait::async_trait]
impl RoomSession for ReplaySession {
    async fn connect(&self) -> Result<(), SessionError> {
        info!(target: "rs.replay", room_id = %self.room_id, "Replay session connected");
        Ok(())
    }

    async fn add_subscription(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
        kinds: MediaKinds,
    ) -> Result<(), SessionError> {
        info!(
            target: "rs.replay",
            participant_id = %participant_id,
            stream_key = %stream_key,
            kinds = %kinds,
            "addSubscription"
        );
        Ok(())
    }

    async fn add_stream(
        &self,
        stream_key: &StreamKey,
        tracks: LocalTracks,
    ) -> Result<(), SessionError> {
        info!(
            target: "rs.replay",
            stream_key = %stream_key,
            audio = tracks.audio.is_some(),
            video = tracks.video.is_some(),
            "addStream"
        );
        Ok(())
    }

    fn participant_stream(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
    ) -> Option<RemoteStream> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        let stream = latest
            .streams
            .iter()
            .find(|s| &s.participant_id == participant_id && &s.key == stream_key)?;

        let fallback = |kind: &str| format!("{participant_id}:{stream_key}:{kind}");
        Some(RemoteStream {
            audio_track: Some(MediaTrack::audio(
                stream.audio_track_id.clone().unwrap_or_else(|| fallback("audio")),
            )),
            video_track: Some(MediaTrack::video(
                stream.video_track_id.clone().unwrap_or_else(|| fallback("video")),
            )),
        })
    }

    fn local_participant_id(&self) -> Option<ParticipantId> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .local_participant_id
            .clone()
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        debug!(target: "rs.replay", room_id = %self.room_id, "Replay session disconnected");
        Ok(())
    }
}

/// Connector that builds a [`ReplaySession`] and keeps it for the feeder.
#[derive(Debug, Default)]
pub struct ReplayConnector {
    session: Mutex<Option<Arc<ReplaySession>>>,
}

impl ReplayConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The session created by the last `initialize`.
    #[must_use]
    pub fn session(&self) -> Option<Arc<ReplaySession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl SessionConnector for ReplayConnector {
    async fn initialize(
        &self,
        init: SessionInit,
        callbacks: CallbackSink,
    ) -> Result<Arc<dyn RoomSession>, SessionError> {
        info!(
            target: "rs.replay",
            room_id = %init.room_id,
            log_level = %init.log_level,
            "Initializing replay session"
        );

        let session = Arc::new(ReplaySession::new(init.room_id, callbacks));
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&session));
        Ok(session as Arc<dyn RoomSession>)
    }
}

/// Capture that always grants fixed synthetic tracks.
#[derive(Debug, Default)]
pub struct SyntheticCapture;

#[async_trait::async_trait]
impl MediaCapture for SyntheticCapture {
    async fn acquire(&self, kinds: MediaKinds) -> Result<LocalMedia, CaptureError> {
        if kinds.is_empty() {
            return Err(CaptureError::Unavailable("no media kind requested".to_string()));
        }
        Ok(LocalMedia::new(MediaHandle::combine(
            kinds.audio.then(|| MediaTrack::audio("synthetic-audio")),
            kinds.video.then(|| MediaTrack::video("synthetic-video")),
        )))
    }
}
