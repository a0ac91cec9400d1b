//! Local stream map: participant id to renderable media handle.
//!
//! The map is copy-on-write. Every mutation builds a fresh
//! [`StreamMapSnapshot`] and publishes it through a `watch` channel, so a
//! renderer holding a snapshot never sees a half-applied update. Entries
//! keep insertion order; replacing a handle keeps its position.
//!
//! Only the subscription policy engine holds the writer.

use crate::errors::SyncError;
use crate::media::MediaHandle;
use crate::observability::metrics;
use common::types::ParticipantId;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Immutable view of the map at one version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMapSnapshot {
    version: u64,
    entries: Vec<(ParticipantId, MediaHandle)>,
}

impl StreamMapSnapshot {
    /// Monotonic version, bumped on every published change.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn get(&self, participant_id: &ParticipantId) -> Option<&MediaHandle> {
        self.entries
            .iter()
            .find(|(id, _)| id == participant_id)
            .map(|(_, handle)| handle)
    }

    #[must_use]
    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.get(participant_id).is_some()
    }

    /// Handles in insertion order, for rendering.
    pub fn handles(&self) -> impl Iterator<Item = &MediaHandle> {
        self.entries.iter().map(|(_, handle)| handle)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ParticipantId, &MediaHandle)> {
        self.entries.iter().map(|(id, handle)| (id, handle))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writer side of the map.
#[derive(Debug)]
pub struct LocalStreamMap {
    sender: watch::Sender<Arc<StreamMapSnapshot>>,
}

impl Default for LocalStreamMap {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStreamMap {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(StreamMapSnapshot::default()));
        Self { sender }
    }

    /// Create an observer of this map.
    #[must_use]
    pub fn subscribe(&self) -> StreamMapReceiver {
        StreamMapReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<StreamMapSnapshot> {
        Arc::clone(&self.sender.borrow())
    }

    /// Upsert the handle for a participant.
    ///
    /// Returns `false` (and publishes nothing) when the same handle is
    /// already present.
    pub fn set(&mut self, participant_id: ParticipantId, handle: MediaHandle) -> bool {
        let current = self.current();
        let mut entries = current.entries.clone();

        match entries.iter_mut().find(|(id, _)| *id == participant_id) {
            Some((_, existing)) if *existing == handle => return false,
            Some((_, existing)) => *existing = handle,
            None => entries.push((participant_id.clone(), handle)),
        }

        debug!(
            target: "rs.map",
            participant_id = %participant_id,
            version = current.version + 1,
            "Stream map entry set"
        );
        self.publish(current.version, entries);
        true
    }

    /// Remove a participant's entry. Absent ids are a no-op.
    pub fn remove(&mut self, participant_id: &ParticipantId) -> bool {
        let current = self.current();
        if !current.contains(participant_id) {
            return false;
        }

        let entries = current
            .entries
            .iter()
            .filter(|(id, _)| id != participant_id)
            .cloned()
            .collect();

        debug!(
            target: "rs.map",
            participant_id = %participant_id,
            version = current.version + 1,
            "Stream map entry removed"
        );
        self.publish(current.version, entries);
        true
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> bool {
        let current = self.current();
        if current.is_empty() {
            return false;
        }
        self.publish(current.version, Vec::new());
        true
    }

    fn publish(&mut self, previous_version: u64, entries: Vec<(ParticipantId, MediaHandle)>) {
        metrics::set_visible_streams(entries.len());
        self.sender.send_replace(Arc::new(StreamMapSnapshot {
            version: previous_version + 1,
            entries,
        }));
    }
}

/// Read side of the map, handed to renderers.
#[derive(Debug, Clone)]
pub struct StreamMapReceiver {
    receiver: watch::Receiver<Arc<StreamMapSnapshot>>,
}

impl StreamMapReceiver {
    /// Latest snapshot, marking it as seen.
    #[must_use]
    pub fn snapshot(&mut self) -> Arc<StreamMapSnapshot> {
        Arc::clone(&self.receiver.borrow_and_update())
    }

    /// Wait for the next version and return it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] once the writer is gone.
    pub async fn changed(&mut self) -> Result<Arc<StreamMapSnapshot>, SyncError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| SyncError::Stopped)?;
        Ok(self.snapshot())
    }

    #[must_use]
    pub fn get(&self, participant_id: &ParticipantId) -> Option<MediaHandle> {
        self.receiver.borrow().get(participant_id).cloned()
    }

    /// Current handles in insertion order.
    #[must_use]
    pub fn handles(&self) -> Vec<MediaHandle> {
        self.receiver.borrow().handles().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.borrow().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::MediaTrack;

    fn handle(audio: &str, video: &str) -> MediaHandle {
        MediaHandle::combine(Some(MediaTrack::audio(audio)), Some(MediaTrack::video(video)))
    }

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    #[test]
    fn test_set_replaces_never_duplicates() {
        let mut map = LocalStreamMap::new();
        let rx = map.subscribe();

        assert!(map.set(pid("A"), handle("a1", "v1")));
        assert!(map.set(pid("A"), handle("a2", "v2")));

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.get(&pid("A")), Some(handle("a2", "v2")));
    }

    #[test]
    fn test_set_identical_handle_does_not_publish() {
        let mut map = LocalStreamMap::new();
        map.set(pid("A"), handle("a1", "v1"));
        let version = map.current().version();

        assert!(!map.set(pid("A"), handle("a1", "v1")));
        assert_eq!(map.current().version(), version);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut map = LocalStreamMap::new();
        let version = map.current().version();

        assert!(!map.remove(&pid("nobody")));
        assert_eq!(map.current().version(), version);
    }

    #[test]
    fn test_insertion_order_kept_on_replace() {
        let mut map = LocalStreamMap::new();
        let rx = map.subscribe();

        map.set(pid("A"), handle("a1", "v1"));
        map.set(pid("B"), handle("b1", "w1"));
        map.set(pid("A"), handle("a2", "v2"));

        assert_eq!(rx.handles(), vec![handle("a2", "v2"), handle("b1", "w1")]);
    }

    #[test]
    fn test_old_snapshot_is_unaffected_by_later_writes() {
        let mut map = LocalStreamMap::new();
        let mut rx = map.subscribe();

        map.set(pid("A"), handle("a1", "v1"));
        let before = rx.snapshot();
        map.remove(&pid("A"));
        map.set(pid("B"), handle("b1", "w1"));

        assert_eq!(before.len(), 1);
        assert!(before.contains(&pid("A")));
        assert!(!rx.snapshot().contains(&pid("A")));
    }

    #[test]
    fn test_clear() {
        let mut map = LocalStreamMap::new();
        assert!(!map.clear());

        map.set(pid("A"), handle("a1", "v1"));
        map.set(pid("B"), handle("b1", "w1"));
        assert!(map.clear());
        assert!(map.current().is_empty());
    }

    #[tokio::test]
    async fn test_changed_delivers_new_version() {
        let mut map = LocalStreamMap::new();
        let mut rx = map.subscribe();

        map.set(pid("A"), handle("a1", "v1"));
        let snapshot = rx.changed().await.unwrap();

        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.get(&pid("A")), Some(&handle("a1", "v1")));
    }

    #[tokio::test]
    async fn test_changed_errors_when_writer_dropped() {
        let map = LocalStreamMap::new();
        let mut rx = map.subscribe();
        drop(map);

        assert!(matches!(rx.changed().await, Err(SyncError::Stopped)));
    }
}
