//! Mock media capture.
//!
//! # Example
//!
//! ```rust,ignore
//! use room_test_utils::MockCapture;
//!
//! let capture = MockCapture::denied();
//! // publish() now fails with CaptureError::Denied
//! ```

use async_trait::async_trait;
use room_sync::errors::CaptureError;
use room_sync::media::{LocalMedia, MediaHandle, MediaKinds, MediaTrack};
use room_sync::publish::MediaCapture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Capture whose outcome is fixed at construction.
#[derive(Debug)]
pub struct MockCapture {
    outcome: Result<(), CaptureError>,
    calls: AtomicUsize,
}

impl MockCapture {
    /// Capture that grants a local audio and video track.
    #[must_use]
    pub fn granted() -> Arc<Self> {
        Self::with_outcome(Ok(()))
    }

    /// Capture that fails as if the user denied permission.
    #[must_use]
    pub fn denied() -> Arc<Self> {
        Self::with_outcome(Err(CaptureError::Denied))
    }

    /// Capture that fails as if the device were held elsewhere.
    #[must_use]
    pub fn busy() -> Arc<Self> {
        Self::with_outcome(Err(CaptureError::DeviceBusy))
    }

    fn with_outcome(outcome: Result<(), CaptureError>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of `acquire` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Handle produced by a granted capture.
    #[must_use]
    pub fn local_handle() -> MediaHandle {
        MediaHandle::combine(
            Some(MediaTrack::audio("local-mic")),
            Some(MediaTrack::video("local-camera")),
        )
    }
}

#[async_trait]
impl MediaCapture for MockCapture {
    async fn acquire(&self, _kinds: MediaKinds) -> Result<LocalMedia, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()?;
        Ok(LocalMedia::new(Self::local_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcomes() {
        let granted = MockCapture::granted();
        let media = granted.acquire(MediaKinds::BOTH).await.unwrap();
        assert_eq!(media.handle, MockCapture::local_handle());
        assert_eq!(granted.calls(), 1);

        assert_eq!(
            MockCapture::denied().acquire(MediaKinds::BOTH).await,
            Err(CaptureError::Denied)
        );
        assert_eq!(
            MockCapture::busy().acquire(MediaKinds::BOTH).await,
            Err(CaptureError::DeviceBusy)
        );
    }
}
