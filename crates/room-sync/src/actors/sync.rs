//! `RoomSyncActor` - single writer for all room state.
//!
//! The actor drains session callbacks strictly in arrival order. Each
//! callback is normalized, checked against the sequence guard, applied to
//! the room state store, and then handed to the subscription policy engine,
//! all without awaiting. Subscribe commands are spawned as separate tasks
//! whose outcome comes back through the mailbox, so a slow or failing
//! session never stalls the pipeline.
//!
//! The actor stops when cancelled or when the session's callback channel
//! closes.

use super::messages::{SubscriptionInfo, SyncMessage, SyncState};
use super::metrics::MailboxMonitor;
use crate::errors::{SessionError, SyncError};
use crate::events::{EventNormalizer, RawCallback, SequencedEvent, SessionEvent};
use crate::media::MediaKinds;
use crate::observability::metrics;
use crate::policy::{SequenceGuard, SubscribeRequest, SubscriptionPolicyEngine};
use crate::publish::PublishController;
use crate::session::RoomSession;
use crate::store::RoomStateStore;
use crate::stream_map::LocalStreamMap;
use common::types::StreamRef;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the sync mailbox.
const SYNC_CHANNEL_BUFFER: usize = 256;

/// Handle to a `RoomSyncActor`.
#[derive(Clone, Debug)]
pub struct RoomSyncHandle {
    sender: mpsc::Sender<SyncMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomSyncHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Query the diagnostic state.
    pub async fn state(&self) -> Result<SyncState, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SyncMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| SyncError::Stopped)?;

        rx.await.map_err(|_| SyncError::Stopped)
    }

    /// Deliver a callback directly to the actor.
    pub async fn deliver(&self, callback: RawCallback) -> Result<(), SyncError> {
        self.sender
            .send(SyncMessage::Callback(callback))
            .await
            .map_err(|_| SyncError::Stopped)
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomSyncActor` implementation.
pub struct RoomSyncActor {
    room_id: String,
    session: Arc<dyn RoomSession>,
    /// Mailbox receiver.
    receiver: mpsc::Receiver<SyncMessage>,
    /// Weak mailbox sender for subscribe outcomes; does not keep the mailbox open.
    outcome_sender: mpsc::WeakSender<SyncMessage>,
    /// Session callbacks, in emission order.
    callbacks: mpsc::Receiver<RawCallback>,
    cancel_token: CancellationToken,
    normalizer: EventNormalizer,
    guard: SequenceGuard,
    store: RoomStateStore,
    engine: SubscriptionPolicyEngine,
    publisher: Option<Arc<PublishController>>,
    events_applied: u64,
    stale_dropped: u64,
    mailbox: MailboxMonitor,
}

impl RoomSyncActor {
    /// Spawn a new sync actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room identifier, used for logging
    /// * `session` - Session that receives subscribe commands
    /// * `callbacks` - Receiving half of the session callback channel
    /// * `map` - Writer of the local stream map; the actor becomes its only owner
    /// * `publisher` - Local publication to end when the session disconnects
    /// * `subscribe_kinds` - Media kinds requested by every subscribe command
    /// * `cancel_token` - Cancellation token
    pub fn spawn(
        room_id: String,
        session: Arc<dyn RoomSession>,
        callbacks: mpsc::Receiver<RawCallback>,
        map: LocalStreamMap,
        publisher: Option<Arc<PublishController>>,
        subscribe_kinds: MediaKinds,
        cancel_token: CancellationToken,
    ) -> (RoomSyncHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SYNC_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            session,
            receiver,
            outcome_sender: sender.downgrade(),
            callbacks,
            cancel_token: cancel_token.clone(),
            normalizer: EventNormalizer::new(),
            guard: SequenceGuard::new(),
            store: RoomStateStore::new(),
            engine: SubscriptionPolicyEngine::new(subscribe_kinds, map),
            publisher,
            events_applied: 0,
            stale_dropped: 0,
            mailbox: MailboxMonitor::new(&room_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomSyncHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rs.actor.sync", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rs.actor.sync",
            room_id = %self.room_id,
            "RoomSyncActor started"
        );

        let mut mailbox_open = true;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rs.actor.sync",
                        room_id = %self.room_id,
                        "RoomSyncActor received cancellation signal"
                    );
                    break;
                }

                callback = self.callbacks.recv() => {
                    if let Some(raw) = callback {
                        self.mailbox.record_receive(self.queued());
                        self.handle_callback(&raw);
                    } else {
                        info!(
                            target: "rs.actor.sync",
                            room_id = %self.room_id,
                            "Session callback channel closed, exiting"
                        );
                        break;
                    }
                }

                msg = self.receiver.recv(), if mailbox_open => {
                    if let Some(message) = msg {
                        self.mailbox.record_receive(self.queued());
                        self.handle_message(message);
                    } else {
                        // Every handle is gone; keep following the session.
                        mailbox_open = false;
                    }
                }
            }
        }

        info!(
            target: "rs.actor.sync",
            room_id = %self.room_id,
            events_applied = self.events_applied,
            messages_processed = self.mailbox.messages_processed(),
            peak_depth = self.mailbox.peak_depth(),
            "RoomSyncActor stopped"
        );
    }

    /// Callbacks and mailbox messages still waiting.
    fn queued(&self) -> usize {
        self.callbacks.len() + self.receiver.len()
    }

    fn handle_message(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Callback(raw) => self.handle_callback(&raw),

            SyncMessage::SubscribeOutcome {
                stream,
                attempt,
                result,
            } => {
                self.handle_subscribe_outcome(&stream, attempt, result);
            }

            SyncMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    fn handle_callback(&mut self, raw: &RawCallback) {
        let Some(SequencedEvent {
            sequence, event, ..
        }) = self.normalizer.normalize(raw)
        else {
            return;
        };

        // Arrival order is already application order; only session-assigned
        // numbers can reveal reordering.
        if let (Some(stream), Some(sequence)) = (event.stream(), sequence) {
            if !self.guard.admit(stream, sequence) {
                self.stale_dropped += 1;
                return;
            }
        }

        self.apply(&event);
    }

    /// Apply one admitted event: store first, then policy.
    fn apply(&mut self, event: &SessionEvent) {
        if self.store.local_participant_id().is_none() {
            if let Some(local) = self.session.local_participant_id() {
                self.store.set_local_participant(local);
            }
        }

        let catch_up = self.store.apply(event);

        let to_subscribe = match event {
            SessionEvent::Connected { .. } => self.engine.on_connected(&catch_up, &self.store),
            SessionEvent::ParticipantJoined { participant_id, .. } => {
                debug!(
                    target: "rs.actor.sync",
                    participant_id = %participant_id,
                    "Participant joined"
                );
                Vec::new()
            }
            SessionEvent::ParticipantLeft { participant_id, .. } => {
                self.engine.on_participant_left(participant_id);
                self.guard.forget_participant(participant_id);
                Vec::new()
            }
            SessionEvent::StreamPublished { stream, .. } => self
                .engine
                .on_stream_published(stream, &self.store)
                .into_iter()
                .collect(),
            SessionEvent::StreamUnpublished { stream, .. } => {
                self.engine.on_stream_unpublished(stream);
                self.guard.forget(stream);
                Vec::new()
            }
            SessionEvent::SubscriptionStarted { stream, .. } => {
                let negotiated = self
                    .session
                    .participant_stream(&stream.participant_id, &stream.stream_key);
                self.engine
                    .on_subscription_started(stream, &self.store, negotiated);
                Vec::new()
            }
            SessionEvent::SubscriptionEnded { stream, .. } => {
                self.engine.on_subscription_ended(stream);
                Vec::new()
            }
            SessionEvent::Disconnected => {
                self.engine.on_disconnected();
                self.guard.clear();
                if let Some(publisher) = &self.publisher {
                    publisher.end();
                }
                warn!(
                    target: "rs.actor.sync",
                    room_id = %self.room_id,
                    "Session disconnected, room state cleared"
                );
                Vec::new()
            }
        };

        self.engine.reconcile(&self.store);
        self.events_applied += 1;

        for request in to_subscribe {
            self.issue_subscribe(request);
        }
    }

    /// Issue `add_subscription` without waiting for it.
    fn issue_subscribe(&self, request: SubscribeRequest) {
        let SubscribeRequest { stream, attempt } = request;
        let session = Arc::clone(&self.session);
        let outcome_sender = self.outcome_sender.clone();
        let kinds = self.engine.kinds();

        debug!(
            target: "rs.actor.sync",
            stream = %stream,
            attempt,
            kinds = %kinds,
            "Issuing subscribe command"
        );
        metrics::record_subscribe_command("issued");

        tokio::spawn(async move {
            let result = session
                .add_subscription(&stream.participant_id, &stream.stream_key, kinds)
                .await;
            if let Some(sender) = outcome_sender.upgrade() {
                let _ = sender
                    .send(SyncMessage::SubscribeOutcome {
                        stream,
                        attempt,
                        result,
                    })
                    .await;
            }
        });
    }

    fn handle_subscribe_outcome(
        &mut self,
        stream: &StreamRef,
        attempt: u64,
        result: Result<(), SessionError>,
    ) {
        match result {
            Ok(()) => {
                metrics::record_subscribe_command("success");
                debug!(
                    target: "rs.actor.sync",
                    stream = %stream,
                    "Subscribe command accepted"
                );
            }
            Err(e) => {
                metrics::record_subscribe_command("error");
                warn!(
                    target: "rs.actor.sync",
                    stream = %stream,
                    attempt,
                    error = %e,
                    "Subscribe command failed, stream left unsubscribed"
                );
                self.engine.on_subscribe_failed(stream, attempt);
            }
        }
    }

    fn state(&self) -> SyncState {
        SyncState {
            room_id: self.room_id.clone(),
            local_participant_id: self.store.local_participant_id().cloned(),
            participants: self
                .store
                .participants()
                .map(|p| p.participant_id.clone())
                .collect(),
            streams: self.store.streams().cloned().collect(),
            subscriptions: self
                .engine
                .statuses()
                .map(|(stream, status)| SubscriptionInfo {
                    stream: stream.clone(),
                    status,
                })
                .collect(),
            visible_streams: self.engine.visible(),
            events_applied: self.events_applied,
            events_dropped: self.normalizer.dropped() + self.stale_dropped,
            mailbox_peak_depth: self.mailbox.peak_depth(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::{LocalTracks, MediaTrack, RemoteStream};
    use crate::policy::SubscriptionStatus;
    use common::types::{ParticipantId, StreamKey};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubSession {
        reject_subscriptions: bool,
        subscriptions: Mutex<Vec<StreamRef>>,
    }

    impl StubSession {
        fn subscription_count(&self) -> usize {
            self.subscriptions.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl RoomSession for StubSession {
        async fn connect(&self) -> Result<(), SessionError> {
            Ok(())
        }

        async fn add_subscription(
            &self,
            participant_id: &ParticipantId,
            stream_key: &StreamKey,
            _kinds: MediaKinds,
        ) -> Result<(), SessionError> {
            self.subscriptions.lock().unwrap().push(StreamRef {
                participant_id: participant_id.clone(),
                stream_key: stream_key.clone(),
            });
            if self.reject_subscriptions {
                return Err(SessionError::Rejected("stream not found".to_string()));
            }
            Ok(())
        }

        async fn add_stream(
            &self,
            _stream_key: &StreamKey,
            _tracks: LocalTracks,
        ) -> Result<(), SessionError> {
            Ok(())
        }

        fn participant_stream(
            &self,
            participant_id: &ParticipantId,
            _stream_key: &StreamKey,
        ) -> Option<RemoteStream> {
            Some(RemoteStream {
                audio_track: Some(MediaTrack::audio(format!("{participant_id}-a"))),
                video_track: Some(MediaTrack::video(format!("{participant_id}-v"))),
            })
        }

        fn local_participant_id(&self) -> Option<ParticipantId> {
            None
        }

        async fn disconnect(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn room_state() -> serde_json::Value {
        json!({
            "participants": [
                { "participantId": "A", "origin": "remote" },
                { "participantId": "B", "origin": "local" }
            ],
            "streams": [
                { "participantId": "A", "key": "cam" },
                { "participantId": "B", "key": "self" }
            ]
        })
    }

    fn spawn_actor(
        session: Arc<StubSession>,
    ) -> (RoomSyncHandle, JoinHandle<()>, mpsc::Sender<RawCallback>) {
        let (callback_tx, callback_rx) = mpsc::channel(16);
        let (handle, task) = RoomSyncActor::spawn(
            "room-1".to_string(),
            session,
            callback_rx,
            LocalStreamMap::new(),
            None,
            MediaKinds::BOTH,
            CancellationToken::new(),
        );
        (handle, task, callback_tx)
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !check() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_spawn_and_cancel() {
        let (handle, task, _callbacks) = spawn_actor(Arc::new(StubSession::default()));

        assert_eq!(handle.room_id(), "room-1");
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connected_catch_up_subscribes_remote_only() {
        let session = Arc::new(StubSession::default());
        let (handle, _task, callbacks) = spawn_actor(session.clone());

        callbacks
            .send(RawCallback::new("connected").state(room_state()))
            .await
            .unwrap();

        let state = handle.state().await.unwrap();
        assert_eq!(state.local_participant_id, Some(ParticipantId::from("B")));
        assert_eq!(
            state.subscription(&StreamRef::new("A", "cam")),
            Some(SubscriptionStatus::Pending)
        );
        assert_eq!(state.subscription(&StreamRef::new("B", "self")), None);

        eventually(|| session.subscription_count() == 1).await;
        assert_eq!(
            *session.subscriptions.lock().unwrap(),
            vec![StreamRef::new("A", "cam")]
        );

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rejected_subscribe_reverts_to_unsubscribed() {
        let session = Arc::new(StubSession {
            reject_subscriptions: true,
            ..StubSession::default()
        });
        let (handle, _task, callbacks) = spawn_actor(session.clone());

        callbacks
            .send(
                RawCallback::new("stream_published")
                    .stream("A", "cam")
                    .state(room_state()),
            )
            .await
            .unwrap();

        eventually(|| session.subscription_count() == 1).await;
        let cam = StreamRef::new("A", "cam");
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.state().await.unwrap().subscription(&cam).is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let state = handle.state().await.unwrap();
        assert_eq!(state.visible_streams, 0);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_stale_keyed_event_is_dropped() {
        let (handle, _task, callbacks) = spawn_actor(Arc::new(StubSession::default()));

        for raw in [
            RawCallback::new("stream_published")
                .stream("A", "cam")
                .sequence(1)
                .state(room_state()),
            RawCallback::new("subscription_ended")
                .stream("A", "cam")
                .sequence(3)
                .state(room_state()),
            RawCallback::new("subscription_started")
                .stream("A", "cam")
                .sequence(2)
                .state(room_state()),
        ] {
            callbacks.send(raw).await.unwrap();
        }

        let state = handle.state().await.unwrap();
        assert_eq!(state.events_applied, 2);
        assert_eq!(state.events_dropped, 1);
        assert_eq!(
            state.subscription(&StreamRef::new("A", "cam")),
            Some(SubscriptionStatus::Removed)
        );
        assert_eq!(state.visible_streams, 0);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_unsequenced_event_follows_sequenced_one() {
        let (handle, _task, callbacks) = spawn_actor(Arc::new(StubSession::default()));

        callbacks
            .send(
                RawCallback::new("stream_published")
                    .stream("A", "cam")
                    .sequence(100)
                    .state(room_state()),
            )
            .await
            .unwrap();
        callbacks
            .send(
                RawCallback::new("subscription_started")
                    .stream("A", "cam")
                    .state(room_state()),
            )
            .await
            .unwrap();

        let state = handle.state().await.unwrap();
        assert_eq!(state.events_applied, 2);
        assert_eq!(state.events_dropped, 0);
        assert_eq!(
            state.subscription(&StreamRef::new("A", "cam")),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(state.visible_streams, 1);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_republished_stream_restarts_sequencing() {
        let (handle, _task, callbacks) = spawn_actor(Arc::new(StubSession::default()));

        for raw in [
            RawCallback::new("stream_published")
                .stream("A", "cam")
                .sequence(5)
                .state(room_state()),
            RawCallback::new("stream_unpublished")
                .stream("A", "cam")
                .sequence(6)
                .state(room_state()),
            RawCallback::new("stream_published")
                .stream("A", "cam")
                .sequence(2)
                .state(room_state()),
        ] {
            callbacks.send(raw).await.unwrap();
        }

        let state = handle.state().await.unwrap();
        assert_eq!(state.events_applied, 3);
        assert_eq!(state.events_dropped, 0);
        assert_eq!(
            state.subscription(&StreamRef::new("A", "cam")),
            Some(SubscriptionStatus::Pending)
        );
        handle.cancel();
    }

    #[tokio::test]
    async fn test_peak_depth_counts_queued_callbacks() {
        let (handle, _task, callbacks) = spawn_actor(Arc::new(StubSession::default()));

        // The actor does not run until this task yields, so all ten queue up.
        for _ in 0..10 {
            callbacks
                .send(RawCallback::new("participant_joined").participant("A").state(room_state()))
                .await
                .unwrap();
        }

        let state = handle.state().await.unwrap();
        assert_eq!(state.events_applied, 10);
        assert!(state.mailbox_peak_depth >= 10);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_deliver_through_handle_and_decode_drop() {
        let (handle, _task, _callbacks) = spawn_actor(Arc::new(StubSession::default()));

        handle.deliver(RawCallback::new("mystery")).await.unwrap();
        handle
            .deliver(RawCallback::new("participant_joined").participant("A").state(room_state()))
            .await
            .unwrap();

        let state = handle.state().await.unwrap();
        assert_eq!(state.events_dropped, 1);
        assert_eq!(state.events_applied, 1);
        assert_eq!(state.participants.len(), 2);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_closed_callback_channel_stops_actor() {
        let (handle, task, callbacks) = spawn_actor(Arc::new(StubSession::default()));

        drop(callbacks);
        task.await.unwrap();

        assert!(matches!(handle.state().await, Err(SyncError::Stopped)));
    }
}
