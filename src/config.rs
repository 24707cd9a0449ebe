//! Configuration types for Turntable

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recording mode, governing whether missed requests fall through to the
/// real network and get captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// Playback only: a missed request is reported to the miss handler
    Disabled,
    /// Record everything when the fixture file is absent; plain playback
    /// when it exists
    RecordIfFixtureMissing,
    /// Fixture must exist; requests that miss against it are recorded
    RecordIfTracksMissing,
}

/// Request fields available to the matcher chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestField {
    /// HTTP method, compared case-insensitively
    Method,
    /// Absolute URL; query parameters compared as an unordered set
    Url,
    /// Header mapping, names compared case-insensitively
    Headers,
    /// Body payload, byte-exact or JSON-structural
    Body,
}

/// Main configuration, passed explicitly at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurntableConfig {
    /// Recording mode
    pub recording_mode: RecordingMode,
    /// Which request fields the matcher chain compares
    pub matched_fields: Vec<RequestField>,
    /// Each track satisfies at most one request per session
    pub play_tracks_uniquely: bool,
    /// Require recorded headers to equal the incoming set instead of being
    /// a subset of it
    #[serde(default)]
    pub exact_headers: bool,
    /// Output location for persisted recordings; defaults to the fixture
    /// path the session was loaded from
    #[serde(default)]
    pub recording_path: Option<PathBuf>,
}

impl Default for TurntableConfig {
    fn default() -> Self {
        Self {
            recording_mode: RecordingMode::Disabled,
            matched_fields: vec![RequestField::Method, RequestField::Url],
            play_tracks_uniquely: true,
            exact_headers: false,
            recording_path: None,
        }
    }
}

impl TurntableConfig {
    /// Playback-only configuration matching on the given fields
    #[must_use]
    pub fn matching_on(fields: Vec<RequestField>) -> Self {
        Self {
            matched_fields: fields,
            ..Self::default()
        }
    }

    /// Set the recording mode
    #[must_use]
    pub fn with_mode(mut self, mode: RecordingMode) -> Self {
        self.recording_mode = mode;
        self
    }

    /// Enable or disable consume-once playback
    #[must_use]
    pub fn with_unique_playback(mut self, unique: bool) -> Self {
        self.play_tracks_uniquely = unique;
        self
    }

    /// Set an explicit output location for persisted recordings
    #[must_use]
    pub fn with_recording_path(mut self, path: PathBuf) -> Self {
        self.recording_path = Some(path);
        self
    }
}
