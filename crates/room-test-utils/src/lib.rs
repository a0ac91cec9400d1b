//! # Room Sync Test Utilities
//!
//! Mocks and fixtures for exercising the room synchronizer without a real
//! media session or camera.
//!
//! ## Modules
//!
//! - `mock_session` - Recording `RoomSession` and its connector
//! - `mock_capture` - `MediaCapture` that grants, denies, or reports busy
//! - `fixtures` - Snapshot builder, callback constructors, config helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = MockSession::new();
//!     let connector = MockConnector::new(session.clone());
//!     let client = RoomClient::start_with_token(
//!         &test_config("http://unused"),
//!         test_token(),
//!         &connector,
//!         MockCapture::granted(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let state = SnapshotBuilder::new().remote("A").stream("A", "cam").build();
//!     session.emit(stream_published("A", "cam", state)).await;
//! }
//! ```

pub mod fixtures;
pub mod mock_capture;
pub mod mock_session;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_capture::*;
pub use mock_session::*;
