/// Playback session domain types
use crate::error::{LecternError, Result};
use serde::{Deserialize, Serialize};

/// Current wall-clock time as Unix epoch milliseconds
pub fn unix_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Rendering backend a session is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Decodes and renders on this device
    #[default]
    Local,
    /// Delegates rendering to an external (cast-style) receiver
    Remote,
}

impl BackendKind {
    /// Convert to string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the server delivers the audio for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayMethod {
    /// Original files streamed as-is
    #[default]
    DirectPlay,
    /// Original codec, remuxed container
    DirectStream,
    /// Server-side transcoded stream
    Transcode,
    /// Device-local files
    Local,
}

impl PlayMethod {
    /// A failing direct stream may be retried once as a transcode
    #[must_use]
    pub fn can_fall_back_to_transcode(&self) -> bool {
        matches!(self, Self::DirectPlay | Self::DirectStream)
    }
}

/// Chapter marker in absolute book-time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Chapter index (0-based)
    pub index: usize,
    /// Chapter title
    pub title: String,
    /// Absolute start in milliseconds
    pub start_ms: u64,
    /// Absolute end in milliseconds (exclusive)
    pub end_ms: u64,
}

impl Chapter {
    /// Create a chapter marker
    pub fn new(index: usize, title: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            index,
            title: title.into(),
            start_ms,
            end_ms,
        }
    }

    /// Chapter length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// One underlying audio file placed within the work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    /// Track index (0-based)
    pub index: usize,
    /// Absolute position of the first sample of this file
    pub start_offset_ms: u64,
    /// File duration in milliseconds
    pub duration_ms: u64,
    /// Where the backend fetches the bytes (server path or local file URI)
    pub content_url: String,
    /// MIME type reported by the server
    #[serde(default)]
    pub mime_type: String,
}

impl AudioTrack {
    /// Create a track descriptor
    pub fn new(
        index: usize,
        start_offset_ms: u64,
        duration_ms: u64,
        content_url: impl Into<String>,
    ) -> Self {
        Self {
            index,
            start_offset_ms,
            duration_ms,
            content_url: content_url.into(),
            mime_type: "audio/mpeg".to_string(),
        }
    }

    /// Absolute end of this file (exclusive)
    pub fn end_ms(&self) -> u64 {
        self.start_offset_ms + self.duration_ms
    }

    /// Whether the absolute position falls inside this file
    pub fn contains(&self, absolute_ms: u64) -> bool {
        absolute_ms >= self.start_offset_ms && absolute_ms < self.end_ms()
    }
}

/// What is currently being listened to
///
/// Owned by the session lifecycle; every mutation goes through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    /// Stable session identifier
    pub id: String,
    /// Work (book or podcast) identifier
    pub library_item_id: String,
    /// Podcast episode identifier
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Title shown to the listener
    #[serde(default)]
    pub display_title: String,
    /// Ordered chapter markers (may be empty)
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    /// Ordered underlying files (at least one)
    pub audio_tracks: Vec<AudioTrack>,
    /// Total duration reported by the server
    pub duration_ms: u64,
    /// Absolute position within the whole work
    pub current_time_ms: u64,
    /// Playback speed multiplier
    pub speed: f32,
    /// Backend the session is routed through
    #[serde(default)]
    pub backend_kind: BackendKind,
    /// Delivery method chosen by the server
    #[serde(default)]
    pub play_method: PlayMethod,
    /// Creation timestamp (Unix epoch ms)
    pub started_at: i64,
    /// Last mutation timestamp (Unix epoch ms)
    pub updated_at: i64,
    /// Accumulated listening time for this session
    #[serde(default)]
    pub time_listening_ms: u64,
    /// Device-local copy rather than a server stream
    #[serde(default)]
    pub is_local: bool,
}

impl PlaybackSession {
    /// Create a server-streamed session positioned at the start of the work
    pub fn new(
        id: impl Into<String>,
        library_item_id: impl Into<String>,
        display_title: impl Into<String>,
        audio_tracks: Vec<AudioTrack>,
    ) -> Self {
        let now = unix_now_ms();
        let duration_ms = audio_tracks.iter().map(AudioTrack::end_ms).max().unwrap_or(0);
        Self {
            id: id.into(),
            library_item_id: library_item_id.into(),
            episode_id: None,
            display_title: display_title.into(),
            chapters: Vec::new(),
            audio_tracks,
            duration_ms,
            current_time_ms: 0,
            speed: 1.0,
            backend_kind: BackendKind::Local,
            play_method: PlayMethod::DirectPlay,
            started_at: now,
            updated_at: now,
            time_listening_ms: 0,
            is_local: false,
        }
    }

    /// Attach chapter markers
    #[must_use]
    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Self {
        self.chapters = chapters;
        self
    }

    /// Attach a podcast episode id
    #[must_use]
    pub fn with_episode(mut self, episode_id: impl Into<String>) -> Self {
        self.episode_id = Some(episode_id.into());
        self
    }

    /// Mark as a device-local copy
    #[must_use]
    pub fn into_local(mut self) -> Self {
        self.is_local = true;
        self.play_method = PlayMethod::Local;
        self
    }

    /// Total duration of the work: the larger of the reported duration and the track extent
    pub fn total_duration_ms(&self) -> u64 {
        let tracks_end = self
            .audio_tracks
            .iter()
            .map(AudioTrack::end_ms)
            .max()
            .unwrap_or(0);
        self.duration_ms.max(tracks_end)
    }

    /// Key shared with remote progress records
    pub fn progress_key(&self) -> String {
        super::progress_key(&self.library_item_id, self.episode_id.as_deref())
    }

    /// Fraction of the work already heard, in `[0.0, 1.0]`
    pub fn progress(&self) -> f64 {
        let total = self.total_duration_ms();
        if total == 0 {
            return 0.0;
        }
        (self.current_time_ms as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Server sessions expire after `max_age_ms`; device-local sessions never do
    pub fn is_stale(&self, now_ms: i64, max_age_ms: u64) -> bool {
        !self.is_local && now_ms.saturating_sub(self.started_at) > max_age_ms as i64
    }

    /// Whether this session can be rendered on `kind`
    pub fn supports_backend(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Local => true,
            // A cast receiver can only fetch server-streamable audio
            BackendKind::Remote => !self.is_local,
        }
    }

    /// Stamp `updated_at`
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms;
    }

    /// Check the segmentation invariants before handing the session to a backend
    pub fn validate(&self) -> Result<()> {
        if self.audio_tracks.is_empty() {
            return Err(LecternError::invalid_session(format!(
                "session {} has no audio tracks",
                self.id
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(LecternError::invalid_session(format!(
                "invalid speed {}",
                self.speed
            )));
        }

        let mut expected_start = 0;
        for track in &self.audio_tracks {
            if track.start_offset_ms != expected_start {
                return Err(LecternError::invalid_session(format!(
                    "track {} starts at {}ms, expected {}ms",
                    track.index, track.start_offset_ms, expected_start
                )));
            }
            expected_start = track.end_ms();
        }

        if self.chapters.is_empty() {
            return Ok(());
        }

        let mut expected_start = 0;
        for chapter in &self.chapters {
            if chapter.start_ms != expected_start || chapter.end_ms <= chapter.start_ms {
                return Err(LecternError::invalid_session(format!(
                    "chapter {} [{}, {}) is not contiguous",
                    chapter.index, chapter.start_ms, chapter.end_ms
                )));
            }
            expected_start = chapter.end_ms;
        }
        if expected_start != self.total_duration_ms() {
            return Err(LecternError::invalid_session(format!(
                "chapters end at {}ms but the work is {}ms long",
                expected_start,
                self.total_duration_ms()
            )));
        }

        Ok(())
    }
}
