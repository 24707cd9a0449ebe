//! Error types for Turntable

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Turntable operations
pub type Result<T> = std::result::Result<T, TurntableError>;

/// Errors that can occur in Turntable
#[derive(Debug, Error)]
pub enum TurntableError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fixture document is missing required fields or is mistyped
    #[error("Malformed fixture: {0}")]
    MalformedFixture(String),

    /// No recorded track matches the incoming request
    #[error("No track found for {method} {url}")]
    TrackNotFound {
        /// Method of the unmatched request
        method: String,
        /// URL of the unmatched request
        url: String,
    },

    /// Recorded tracks could not be written back to disk
    #[error("Failed to persist recording to {path}: {source}")]
    PersistFailure {
        /// Target location of the recording
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TurntableError {
    /// Whether this error is a missed playback lookup
    #[must_use]
    pub fn is_track_not_found(&self) -> bool {
        matches!(self, Self::TrackNotFound { .. })
    }
}
