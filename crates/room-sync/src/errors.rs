//! Room sync error types.
//!
//! Errors fall into four classes:
//! - Fatal configuration / startup errors: abort initialization
//! - Acquisition errors (capture): logged, feature degraded
//! - Decode errors: the offending event is dropped, the pipeline continues
//! - Session command failures: logged, the stream stays unsubscribed
//!
//! Only the first class may stop the process; everything raised inside the
//! event pipeline is logged and absorbed by the sync actor.

use thiserror::Error;

/// Room sync error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Join token could not be acquired.
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Session could not be initialized or connected.
    #[error("Session start failed: {0}")]
    SessionStart(String),

    /// A command issued to a running session failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Local media capture failed.
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// A session callback could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The sync actor is no longer running.
    #[error("Room sync stopped")]
    Stopped,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this error must halt initialization.
    ///
    /// Nothing raised by the event pipeline is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::TokenAcquisition(_) | SyncError::SessionStart(_)
        )
    }

    /// Bounded label for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "config",
            SyncError::TokenAcquisition(_) => "token",
            SyncError::SessionStart(_) => "session_start",
            SyncError::Session(_) => "session",
            SyncError::Capture(_) => "capture",
            SyncError::Decode(_) => "decode",
            SyncError::Stopped => "stopped",
            SyncError::Internal(_) => "internal",
        }
    }
}

/// Errors reported by the external media session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session refused the command.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The session is not reachable right now.
    #[error("session unavailable: {0}")]
    Unavailable(String),

    /// The session has been closed.
    #[error("session closed")]
    Closed,
}

/// Local capture failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or platform denied camera/microphone access.
    #[error("capture permission denied")]
    Denied,

    /// The capture device is held by another process.
    #[error("capture device busy")]
    DeviceBusy,

    /// No usable device or other platform failure.
    #[error("capture unavailable: {0}")]
    Unavailable(String),
}

/// Session callback decode failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Callback name outside the known event set.
    #[error("unknown callback '{0}'")]
    UnknownCallback(String),

    /// A keyed callback arrived without a required argument.
    #[error("callback '{callback}' missing {field}")]
    MissingField {
        callback: String,
        field: &'static str,
    },

    /// The state payload did not match the snapshot shape.
    #[error("malformed snapshot in '{callback}': {reason}")]
    MalformedSnapshot { callback: String, reason: String },
}

impl DecodeError {
    /// Bounded label for the drop counter.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::UnknownCallback(_) => "unknown_callback",
            DecodeError::MissingField { .. } => "missing_field",
            DecodeError::MalformedSnapshot { .. } => "malformed_snapshot",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_startup_errors_are_fatal() {
        assert!(SyncError::Config("ROOM_ID".to_string()).is_fatal());
        assert!(SyncError::TokenAcquisition("401".to_string()).is_fatal());
        assert!(SyncError::SessionStart("refused".to_string()).is_fatal());

        assert!(!SyncError::Session(SessionError::Closed).is_fatal());
        assert!(!SyncError::Capture(CaptureError::Denied).is_fatal());
        assert!(!SyncError::Decode(DecodeError::UnknownCallback("x".to_string())).is_fatal());
        assert!(!SyncError::Stopped.is_fatal());
        assert!(!SyncError::Internal("channel".to_string()).is_fatal());
    }

    #[test]
    fn test_conversions() {
        let err: SyncError = CaptureError::DeviceBusy.into();
        assert!(matches!(err, SyncError::Capture(CaptureError::DeviceBusy)));
        assert_eq!(err.kind(), "capture");

        let err: SyncError = SessionError::Rejected("no such stream".to_string()).into();
        assert_eq!(err.kind(), "session");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            SyncError::Capture(CaptureError::Denied).to_string(),
            "Capture error: capture permission denied"
        );
        assert_eq!(
            DecodeError::MissingField {
                callback: "stream_published".to_string(),
                field: "stream_key",
            }
            .to_string(),
            "callback 'stream_published' missing stream_key"
        );
    }

    #[test]
    fn test_decode_reason_labels() {
        assert_eq!(
            DecodeError::UnknownCallback("x".to_string()).reason(),
            "unknown_callback"
        );
        assert_eq!(
            DecodeError::MalformedSnapshot {
                callback: "connected".to_string(),
                reason: "eof".to_string()
            }
            .reason(),
            "malformed_snapshot"
        );
    }
}
