//! Test fixtures: room snapshots, session callbacks, and configuration.

use common::secret::SecretString;
use common::types::{Origin, ParticipantId, StreamKey};
use room_sync::config::Config;
use room_sync::events::{ParticipantSnapshot, RawCallback, RoomSnapshot, StreamKind, StreamSnapshot};
use room_sync::stream_map::{StreamMapReceiver, StreamMapSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Room id used by [`test_config`].
pub const TEST_ROOM_ID: &str = "room-test";

/// Builder for the `state` payload session callbacks carry.
#[derive(Debug, Default, Clone)]
pub struct SnapshotBuilder {
    snapshot: RoomSnapshot,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remote participant.
    #[must_use]
    pub fn remote(self, participant_id: &str) -> Self {
        self.participant(participant_id, Origin::Remote)
    }

    /// Add the local participant and record it as the snapshot's local id.
    #[must_use]
    pub fn local(mut self, participant_id: &str) -> Self {
        self.snapshot.local_participant_id = Some(ParticipantId::from(participant_id));
        self.participant(participant_id, Origin::Local)
    }

    /// Add a participant with an explicit origin.
    #[must_use]
    pub fn participant(mut self, participant_id: &str, origin: Origin) -> Self {
        self.snapshot.participants.push(ParticipantSnapshot {
            participant_id: ParticipantId::from(participant_id),
            origin,
            context: None,
        });
        self
    }

    /// Add a combined audio/video stream.
    #[must_use]
    pub fn stream(mut self, participant_id: &str, key: &str) -> Self {
        self.snapshot.streams.push(StreamSnapshot {
            participant_id: ParticipantId::from(participant_id),
            key: StreamKey::from(key),
            kind: StreamKind::Combined,
            audio_track_id: None,
            video_track_id: None,
        });
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.clone()
    }

    /// Serialize to the JSON shape the session sends.
    #[must_use]
    pub fn build(&self) -> serde_json::Value {
        serde_json::to_value(&self.snapshot).unwrap()
    }
}

/// `connected` callback.
#[must_use]
pub fn connected(state: &SnapshotBuilder) -> RawCallback {
    RawCallback::new("connected").state(state.build())
}

/// `disconnected` callback.
#[must_use]
pub fn disconnected() -> RawCallback {
    RawCallback::new("disconnected")
}

/// `participant_joined` callback.
#[must_use]
pub fn participant_joined(participant_id: &str, state: &SnapshotBuilder) -> RawCallback {
    RawCallback::new("participant_joined")
        .participant(participant_id)
        .state(state.build())
}

/// `participant_left` callback.
#[must_use]
pub fn participant_left(participant_id: &str, state: &SnapshotBuilder) -> RawCallback {
    RawCallback::new("participant_left")
        .participant(participant_id)
        .state(state.build())
}

/// `stream_published` callback.
#[must_use]
pub fn stream_published(participant_id: &str, key: &str, state: &SnapshotBuilder) -> RawCallback {
    keyed("stream_published", participant_id, key, state)
}

/// `stream_unpublished` callback.
#[must_use]
pub fn stream_unpublished(participant_id: &str, key: &str, state: &SnapshotBuilder) -> RawCallback {
    keyed("stream_unpublished", participant_id, key, state)
}

/// `subscription_started` callback.
#[must_use]
pub fn subscription_started(
    participant_id: &str,
    key: &str,
    state: &SnapshotBuilder,
) -> RawCallback {
    keyed("subscription_started", participant_id, key, state)
}

/// `subscription_ended` callback.
#[must_use]
pub fn subscription_ended(participant_id: &str, key: &str, state: &SnapshotBuilder) -> RawCallback {
    keyed("subscription_ended", participant_id, key, state)
}

fn keyed(name: &str, participant_id: &str, key: &str, state: &SnapshotBuilder) -> RawCallback {
    RawCallback::new(name)
        .stream(participant_id, key)
        .state(state.build())
}

/// Configuration pointing the join token request at `api_base_url`.
#[must_use]
pub fn test_config(api_base_url: &str) -> Config {
    test_config_with(api_base_url, &[])
}

/// Like [`test_config`], with additional environment variables set.
#[must_use]
pub fn test_config_with(api_base_url: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("ROOM_ID".to_string(), TEST_ROOM_ID.to_string()),
        ("ROOM_API_KEY".to_string(), "test-api-key".to_string()),
        ("ROOM_API_BASE_URL".to_string(), api_base_url.to_string()),
    ]);
    vars.extend(
        extra
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string())),
    );
    Config::from_vars(&vars).unwrap()
}

/// Client token for starting a room without the HTTP step.
#[must_use]
pub fn test_token() -> SecretString {
    SecretString::from("test-client-token")
}

/// Wait until the stream map satisfies `check`, returning that snapshot.
///
/// # Panics
///
/// Panics after one second.
pub async fn wait_for_map<F>(streams: &mut StreamMapReceiver, check: F) -> Arc<StreamMapSnapshot>
where
    F: Fn(&StreamMapSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let snapshot = streams.snapshot();
            if check(&snapshot) {
                return snapshot;
            }
            if streams.changed().await.is_err() {
                panic!("stream map writer dropped");
            }
        }
    })
    .await
    .expect("stream map did not reach the expected state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_sync::events::SessionEvent;

    #[test]
    fn test_snapshot_builder_decodes() {
        let state = SnapshotBuilder::new()
            .remote("A")
            .local("B")
            .stream("A", "cam");

        let event = SessionEvent::decode(&connected(&state)).unwrap();
        let snapshot = event.snapshot().unwrap();
        assert_eq!(snapshot.local_participant_id, Some(ParticipantId::from("B")));
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.streams.len(), 1);
    }

    #[test]
    fn test_keyed_callbacks_carry_stream() {
        let raw = stream_published("A", "cam", &SnapshotBuilder::new());
        assert_eq!(raw.name, "stream_published");
        assert_eq!(raw.participant_id.as_deref(), Some("A"));
        assert_eq!(raw.stream_key.as_deref(), Some("cam"));
    }

    #[test]
    fn test_config_targets_base_url() {
        let config = test_config("http://127.0.0.1:1");
        assert_eq!(config.room_id, TEST_ROOM_ID);
        assert_eq!(config.api_base_url, "http://127.0.0.1:1");
    }
}
