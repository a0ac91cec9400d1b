//! Mock media session and connector.
//!
//! [`MockSession`] records every command the synchronizer issues and lets a
//! test push session callbacks through the same [`CallbackSink`] a real
//! session would use.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::{MockConnector, MockSession};
//!
//! let session = MockSession::builder()
//!     .with_local_participant("B")
//!     .rejecting_subscriptions()
//!     .build();
//! let connector = MockConnector::new(session.clone());
//! ```

use async_trait::async_trait;
use common::types::{ParticipantId, StreamKey, StreamRef};
use room_sync::errors::SessionError;
use room_sync::events::RawCallback;
use room_sync::media::{LocalTracks, MediaKinds, MediaTrack, RemoteStream};
use room_sync::session::{CallbackSink, RoomSession, SessionConnector, SessionInit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A command received by [`MockSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    AddSubscription { stream: StreamRef, kinds: MediaKinds },
    AddStream { stream_key: StreamKey, tracks: LocalTracks },
    Disconnect,
}

/// Recording session with configurable failures.
#[derive(Debug, Default)]
pub struct MockSession {
    commands: Mutex<Vec<SessionCommand>>,
    sink: Mutex<Option<CallbackSink>>,
    init: Mutex<Option<SessionInit>>,
    negotiated: Mutex<HashMap<StreamRef, RemoteStream>>,
    local_participant_id: Mutex<Option<ParticipantId>>,
    reject_connect: AtomicBool,
    reject_subscriptions: AtomicBool,
    reject_streams: AtomicBool,
    auto_negotiate: AtomicBool,
}

impl MockSession {
    /// Session that accepts everything and negotiates tracks for every
    /// stream it is asked about.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> MockSessionBuilder {
        MockSessionBuilder::default()
    }

    /// Negotiated tracks reported for a stream, mirroring what a real
    /// session would derive from the subscription.
    #[must_use]
    pub fn tracks_for(participant_id: &str, stream_key: &str) -> RemoteStream {
        RemoteStream {
            audio_track: Some(MediaTrack::audio(format!("{participant_id}-{stream_key}-audio"))),
            video_track: Some(MediaTrack::video(format!("{participant_id}-{stream_key}-video"))),
        }
    }

    /// Register the negotiated tracks for a stream explicitly.
    pub fn negotiate(&self, stream: StreamRef, remote: RemoteStream) {
        self.negotiated.lock().unwrap().insert(stream, remote);
    }

    /// Forget negotiated tracks for a stream.
    pub fn forget(&self, stream: &StreamRef) {
        self.negotiated.lock().unwrap().remove(stream);
    }

    /// Change the local participant identity.
    pub fn set_local_participant(&self, participant_id: impl Into<ParticipantId>) {
        *self.local_participant_id.lock().unwrap() = Some(participant_id.into());
    }

    /// Toggle rejection of `add_subscription`.
    pub fn set_reject_subscriptions(&self, reject: bool) {
        self.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    /// Push a callback into the synchronizer.
    ///
    /// # Panics
    ///
    /// Panics when the session was never initialized through
    /// [`MockConnector`] or the synchronizer stopped consuming.
    pub async fn emit(&self, callback: RawCallback) {
        let sink = self
            .sink
            .lock()
            .unwrap()
            .clone()
            .expect("MockSession was not initialized through MockConnector");
        sink.emit(callback)
            .await
            .expect("synchronizer stopped consuming callbacks");
    }

    /// Attach the callback sink handed over at initialization.
    pub fn attach(&self, init: SessionInit, sink: CallbackSink) {
        *self.init.lock().unwrap() = Some(init);
        *self.sink.lock().unwrap() = Some(sink);
    }

    /// Initialization parameters received, if any.
    #[must_use]
    pub fn init(&self) -> Option<SessionInit> {
        self.init.lock().unwrap().clone()
    }

    /// All commands received, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<SessionCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Streams `add_subscription` was called for, in order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<StreamRef> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                SessionCommand::AddSubscription { stream, .. } => Some(stream.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keys `add_stream` was called with, in order.
    #[must_use]
    pub fn added_streams(&self) -> Vec<StreamKey> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                SessionCommand::AddStream { stream_key, .. } => Some(stream_key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait until `add_subscription` has been called `count` times.
    ///
    /// # Panics
    ///
    /// Panics after one second.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.subscriptions().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {count} subscribe commands, saw {:?}",
                self.subscriptions()
            )
        });
    }

    fn record(&self, command: SessionCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl RoomSession for MockSession {
    async fn connect(&self) -> Result<(), SessionError> {
        self.record(SessionCommand::Connect);
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(SessionError::Unavailable("mock connect refused".to_string()));
        }
        Ok(())
    }

    async fn add_subscription(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
        kinds: MediaKinds,
    ) -> Result<(), SessionError> {
        let stream = StreamRef {
            participant_id: participant_id.clone(),
            stream_key: stream_key.clone(),
        };
        self.record(SessionCommand::AddSubscription { stream, kinds });
        if self.reject_subscriptions.load(Ordering::SeqCst) {
            return Err(SessionError::Rejected(format!(
                "no stream {participant_id}/{stream_key}"
            )));
        }
        Ok(())
    }

    async fn add_stream(
        &self,
        stream_key: &StreamKey,
        tracks: LocalTracks,
    ) -> Result<(), SessionError> {
        self.record(SessionCommand::AddStream {
            stream_key: stream_key.clone(),
            tracks,
        });
        if self.reject_streams.load(Ordering::SeqCst) {
            return Err(SessionError::Rejected("mock add_stream refused".to_string()));
        }
        Ok(())
    }

    fn participant_stream(
        &self,
        participant_id: &ParticipantId,
        stream_key: &StreamKey,
    ) -> Option<RemoteStream> {
        let stream = StreamRef {
            participant_id: participant_id.clone(),
            stream_key: stream_key.clone(),
        };
        if let Some(remote) = self.negotiated.lock().unwrap().get(&stream) {
            return Some(remote.clone());
        }
        self.auto_negotiate
            .load(Ordering::SeqCst)
            .then(|| Self::tracks_for(participant_id.as_str(), stream_key.as_str()))
    }

    fn local_participant_id(&self) -> Option<ParticipantId> {
        self.local_participant_id.lock().unwrap().clone()
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.record(SessionCommand::Disconnect);
        Ok(())
    }
}

/// Builder for [`MockSession`].
#[derive(Debug)]
pub struct MockSessionBuilder {
    local_participant_id: Option<ParticipantId>,
    reject_connect: bool,
    reject_subscriptions: bool,
    reject_streams: bool,
    auto_negotiate: bool,
}

impl Default for MockSessionBuilder {
    fn default() -> Self {
        Self {
            local_participant_id: None,
            reject_connect: false,
            reject_subscriptions: false,
            reject_streams: false,
            auto_negotiate: true,
        }
    }
}

impl MockSessionBuilder {
    /// Report this identity as the local participant.
    #[must_use]
    pub fn with_local_participant(mut self, participant_id: impl Into<ParticipantId>) -> Self {
        self.local_participant_id = Some(participant_id.into());
        self
    }

    /// Fail `connect`.
    #[must_use]
    pub fn rejecting_connect(mut self) -> Self {
        self.reject_connect = true;
        self
    }

    /// Fail every `add_subscription`.
    #[must_use]
    pub fn rejecting_subscriptions(mut self) -> Self {
        self.reject_subscriptions = true;
        self
    }

    /// Fail every `add_stream`.
    #[must_use]
    pub fn rejecting_streams(mut self) -> Self {
        self.reject_streams = true;
        self
    }

    /// Only report tracks registered through [`MockSession::negotiate`].
    #[must_use]
    pub fn without_auto_negotiation(mut self) -> Self {
        self.auto_negotiate = false;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MockSession> {
        Arc::new(MockSession {
            local_participant_id: Mutex::new(self.local_participant_id),
            reject_connect: AtomicBool::new(self.reject_connect),
            reject_subscriptions: AtomicBool::new(self.reject_subscriptions),
            reject_streams: AtomicBool::new(self.reject_streams),
            auto_negotiate: AtomicBool::new(self.auto_negotiate),
            ..MockSession::default()
        })
    }
}

/// Connector that hands out a prepared [`MockSession`].
#[derive(Debug)]
pub struct MockConnector {
    session: Arc<MockSession>,
    fail_initialize: bool,
}

impl MockConnector {
    #[must_use]
    pub fn new(session: Arc<MockSession>) -> Self {
        Self {
            session,
            fail_initialize: false,
        }
    }

    /// Connector whose `initialize` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            session: MockSession::new(),
            fail_initialize: true,
        }
    }

    #[must_use]
    pub fn session(&self) -> Arc<MockSession> {
        Arc::clone(&self.session)
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn initialize(
        &self,
        init: SessionInit,
        callbacks: CallbackSink,
    ) -> Result<Arc<dyn RoomSession>, SessionError> {
        if self.fail_initialize {
            return Err(SessionError::Unavailable("mock initialize refused".to_string()));
        }
        self.session.attach(init, callbacks);
        Ok(Arc::clone(&self.session) as Arc<dyn RoomSession>)
    }
}
