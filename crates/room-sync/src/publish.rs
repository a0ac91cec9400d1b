//! Publish controller: the local participant's outbound stream.
//!
//! `publish()` acquires camera and microphone through [`MediaCapture`],
//! hands the captured tracks to the session under the fixed key `"self"`,
//! and exposes the resulting handle on its own `watch` channel. The local
//! stream is never part of the remote stream map.
//!
//! Concurrent `publish()` calls are serialized; once a publication exists,
//! further calls return it without capturing again.

use crate::errors::{CaptureError, SyncError};
use crate::media::{LocalMedia, MediaHandle, MediaKinds};
use crate::observability::metrics;
use crate::session::RoomSession;
use chrono::{DateTime, Utc};
use common::types::StreamKey;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument};

/// Stream key the local publication is added under.
pub const LOCAL_STREAM_KEY: &str = "self";

/// Platform camera/microphone access.
#[async_trait::async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire capture for the requested kinds.
    async fn acquire(&self, kinds: MediaKinds) -> Result<LocalMedia, CaptureError>;
}

/// The local user's published stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPublication {
    pub stream_key: StreamKey,
    pub handle: MediaHandle,
    pub published_at: DateTime<Utc>,
}

/// Owns the local publication lifecycle.
pub struct PublishController {
    session: Arc<dyn RoomSession>,
    capture: Arc<dyn MediaCapture>,
    kinds: MediaKinds,
    publish_lock: Mutex<()>,
    local: watch::Sender<Option<LocalPublication>>,
}

impl PublishController {
    /// Create a controller that captures audio and video.
    #[must_use]
    pub fn new(session: Arc<dyn RoomSession>, capture: Arc<dyn MediaCapture>) -> Self {
        let (local, _) = watch::channel(None);
        Self {
            session,
            capture,
            kinds: MediaKinds::BOTH,
            publish_lock: Mutex::new(()),
            local,
        }
    }

    /// Start publishing the local stream.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capture`] when capture is denied or unavailable
    /// and [`SyncError::Session`] when the session rejects the stream. In
    /// both cases nothing is published.
    #[instrument(skip_all, name = "rs.publish")]
    pub async fn publish(&self) -> Result<MediaHandle, SyncError> {
        let _serialized = self.publish_lock.lock().await;

        let existing = self.local.borrow().as_ref().map(|p| p.handle.clone());
        if let Some(handle) = existing {
            info!(
                target: "rs.publish",
                handle_id = %handle.id,
                "Local stream already published"
            );
            return Ok(handle);
        }

        let media = self.capture.acquire(self.kinds).await.map_err(|e| {
            error!(target: "rs.publish", error = %e, "Local capture failed, publish did not start");
            metrics::record_publish("error");
            SyncError::Capture(e)
        })?;

        let stream_key = StreamKey::from(LOCAL_STREAM_KEY);
        self.session
            .add_stream(&stream_key, media.tracks())
            .await
            .map_err(|e| {
                error!(target: "rs.publish", error = %e, "Session rejected local stream, publish did not start");
                metrics::record_publish("error");
                SyncError::Session(e)
            })?;

        let handle = media.handle.clone();
        self.local.send_replace(Some(LocalPublication {
            stream_key,
            handle: handle.clone(),
            published_at: Utc::now(),
        }));
        metrics::record_publish("success");

        info!(target: "rs.publish", handle_id = %handle.id, "Local stream published");
        Ok(handle)
    }

    /// Drop the local publication, if any.
    pub fn end(&self) {
        if self.local.send_replace(None).is_some() {
            info!(target: "rs.publish", "Local publication ended");
        }
    }

    /// Current publication.
    #[must_use]
    pub fn publication(&self) -> Option<LocalPublication> {
        self.local.borrow().clone()
    }

    /// Observer of the local publication.
    #[must_use]
    pub fn local_stream(&self) -> watch::Receiver<Option<LocalPublication>> {
        self.local.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::SessionError;
    use crate::media::{LocalTracks, MediaTrack, RemoteStream};
    use common::types::ParticipantId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StubSession {
        reject_streams: bool,
        added: StdMutex<Vec<(StreamKey, LocalTracks)>>,
    }

    #[async_trait::async_trait]
    impl RoomSession for StubSession {
        async fn connect(&self) -> Result<(), SessionError> {
            Ok(())
        }

        async fn add_subscription(
            &self,
            _participant_id: &ParticipantId,
            _stream_key: &StreamKey,
            _kinds: MediaKinds,
        ) -> Result<(), SessionError> {
            Ok(())
        }

        async fn add_stream(
            &self,
            stream_key: &StreamKey,
            tracks: LocalTracks,
        ) -> Result<(), SessionError> {
            if self.reject_streams {
                return Err(SessionError::Rejected("not connected".to_string()));
            }
            self.added.lock().unwrap().push((stream_key.clone(), tracks));
            Ok(())
        }

        fn participant_stream(
            &self,
            _participant_id: &ParticipantId,
            _stream_key: &StreamKey,
        ) -> Option<RemoteStream> {
            None
        }

        fn local_participant_id(&self) -> Option<ParticipantId> {
            None
        }

        async fn disconnect(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    struct StubCapture {
        result: Result<(), CaptureError>,
        calls: AtomicUsize,
    }

    impl StubCapture {
        fn granted() -> Self {
            Self {
                result: Ok(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: CaptureError) -> Self {
            Self {
                result: Err(error),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl MediaCapture for StubCapture {
        async fn acquire(&self, _kinds: MediaKinds) -> Result<LocalMedia, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()?;
            Ok(LocalMedia::new(MediaHandle::combine(
                Some(MediaTrack::audio("mic")),
                Some(MediaTrack::video("camera")),
            )))
        }
    }

    #[tokio::test]
    async fn test_publish_adds_self_stream() {
        let session = Arc::new(StubSession::default());
        let controller = PublishController::new(session.clone(), Arc::new(StubCapture::granted()));
        let local = controller.local_stream();

        let handle = controller.publish().await.unwrap();

        assert_eq!(handle.id, "mic+camera");
        let added = session.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        let (key, tracks) = added.first().unwrap();
        assert_eq!(key, &StreamKey::from(LOCAL_STREAM_KEY));
        assert_eq!(tracks.video, Some(MediaTrack::video("camera")));
        assert_eq!(local.borrow().as_ref().unwrap().handle, handle);
    }

    #[tokio::test]
    async fn test_double_publish_returns_existing() {
        let session = Arc::new(StubSession::default());
        let capture = Arc::new(StubCapture::granted());
        let controller = PublishController::new(session.clone(), capture.clone());

        let first = controller.publish().await.unwrap();
        let second = controller.publish().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.added.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_denied_does_not_publish() {
        let session = Arc::new(StubSession::default());
        let controller = PublishController::new(
            session.clone(),
            Arc::new(StubCapture::failing(CaptureError::Denied)),
        );

        let result = controller.publish().await;

        assert!(matches!(result, Err(SyncError::Capture(CaptureError::Denied))));
        assert!(controller.publication().is_none());
        assert!(session.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_rejection_does_not_publish() {
        let session = Arc::new(StubSession {
            reject_streams: true,
            ..StubSession::default()
        });
        let controller = PublishController::new(session, Arc::new(StubCapture::granted()));

        let result = controller.publish().await;

        assert!(matches!(result, Err(SyncError::Session(SessionError::Rejected(_)))));
        assert!(controller.publication().is_none());
    }

    #[tokio::test]
    async fn test_end_clears_publication_and_allows_republish() {
        let session = Arc::new(StubSession::default());
        let capture = Arc::new(StubCapture::granted());
        let controller = PublishController::new(session, capture.clone());

        controller.publish().await.unwrap();
        controller.end();
        assert!(controller.publication().is_none());

        controller.publish().await.unwrap();
        assert_eq!(capture.calls.load(Ordering::SeqCst), 2);
    }
}
