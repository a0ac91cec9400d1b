//! Media handle types.
//!
//! Tracks are owned by the external media session; this crate only moves
//! opaque handles around. A [`MediaHandle`] is the renderable unit the UI
//! consumes: at most one audio and one video track bundled under an id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Set of media kinds requested when subscribing to a remote stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaKinds {
    pub audio: bool,
    pub video: bool,
}

impl MediaKinds {
    /// Audio and video.
    pub const BOTH: Self = Self {
        audio: true,
        video: true,
    };

    /// Audio only.
    pub const AUDIO_ONLY: Self = Self {
        audio: true,
        video: false,
    };

    /// Video only.
    pub const VIDEO_ONLY: Self = Self {
        audio: false,
        video: true,
    };

    /// Whether no kind is requested at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }

    /// Whether the given kind is part of the set.
    #[must_use]
    pub const fn contains(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }
}

impl Default for MediaKinds {
    fn default() -> Self {
        Self::BOTH
    }
}

impl fmt::Display for MediaKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.audio, self.video) {
            (true, true) => f.write_str("audio,video"),
            (true, false) => f.write_str("audio"),
            (false, true) => f.write_str("video"),
            (false, false) => f.write_str("none"),
        }
    }
}

impl FromStr for MediaKinds {
    type Err = String;

    /// Parses a comma separated list such as `"audio,video"` or `"video"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = MediaKinds {
            audio: false,
            video: false,
        };

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "audio" => kinds.audio = true,
                "video" => kinds.video = true,
                other => return Err(format!("unknown media kind '{other}'")),
            }
        }

        if kinds.is_empty() {
            return Err("at least one media kind is required".to_string());
        }
        Ok(kinds)
    }
}

/// Opaque handle to one track owned by the media session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl MediaTrack {
    #[must_use]
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Audio,
        }
    }

    #[must_use]
    pub fn video(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Video,
        }
    }
}

/// Renderable bundle of an audio and a video track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle {
    /// Stable identifier used by renderers as an item key.
    pub id: String,
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

impl MediaHandle {
    /// Bundle two tracks into a new handle.
    ///
    /// The id is derived from the track ids so that combining the same
    /// tracks twice yields equal handles.
    #[must_use]
    pub fn combine(audio: Option<MediaTrack>, video: Option<MediaTrack>) -> Self {
        let id = format!(
            "{}+{}",
            audio.as_ref().map_or("-", |t| t.id.as_str()),
            video.as_ref().map_or("-", |t| t.id.as_str())
        );
        Self { id, audio, video }
    }

    /// Whether the handle carries no track at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

/// Negotiated tracks of a subscribed remote stream, as reported by the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteStream {
    pub audio_track: Option<MediaTrack>,
    pub video_track: Option<MediaTrack>,
}

impl RemoteStream {
    /// Combine the negotiated tracks into one renderable handle.
    #[must_use]
    pub fn into_handle(self) -> MediaHandle {
        MediaHandle::combine(self.audio_track, self.video_track)
    }
}

/// Tracks handed to the session when publishing the local stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalTracks {
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

/// Result of a local capture: the handle shown in the local preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub handle: MediaHandle,
}

impl LocalMedia {
    #[must_use]
    pub fn new(handle: MediaHandle) -> Self {
        Self { handle }
    }

    /// Extract the first audio and video tracks for `add_stream`.
    #[must_use]
    pub fn tracks(&self) -> LocalTracks {
        LocalTracks {
            audio: self.handle.audio.clone(),
            video: self.handle.video.clone(),
        }
    }
}
