//! Recording accumulator

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::fixture::FixtureCodec;
use crate::track::{Track, TrackLibrary};
use crate::{Result, TurntableError};

/// Accumulates tracks captured during a recording session.
///
/// The working set starts as a copy of the base library so a persisted
/// fixture is self-contained; the base is consulted only to suppress
/// re-recording a request URL the fixture already defines.
pub struct Recorder {
    tracks: Vec<Track>,
    base_tracks: Arc<TrackLibrary>,
    output_path: PathBuf,
    persisted: bool,
}

impl Recorder {
    /// Create a recorder seeded from `base`, writing to `output_path`
    #[must_use]
    pub fn new(base: Arc<TrackLibrary>, output_path: PathBuf) -> Self {
        Self {
            tracks: base.tracks().to_vec(),
            base_tracks: base,
            output_path,
            persisted: false,
        }
    }

    /// Create a recorder with no base library
    #[must_use]
    pub fn empty(output_path: PathBuf) -> Self {
        Self::new(Arc::new(TrackLibrary::empty()), output_path)
    }

    /// Append a captured track, in call order.
    ///
    /// A no-op when any base track shares the request URL. The comparison
    /// is URL-only, not method or body.
    pub fn add(&mut self, track: Track) {
        let duplicate = self
            .base_tracks
            .iter()
            .any(|base| base.request.url() == track.request.url());
        if duplicate {
            debug!(
                "Skipping capture of {} {}: URL already in base fixture",
                track.request.method(),
                track.request.url()
            );
            return;
        }

        debug!(
            "Captured {} {} -> {}",
            track.request.method(),
            track.request.url(),
            track.response.status()
        );
        self.tracks.push(track);
    }

    /// Encode the working set and write it to the output path.
    ///
    /// Idempotent: a second call after a successful persist does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::PersistFailure`] when the target location
    /// cannot be written.
    pub fn persist(&mut self) -> Result<()> {
        if self.persisted {
            return Ok(());
        }

        let document = FixtureCodec::new().encode_document(&self.tracks);
        fs::write(&self.output_path, document).map_err(|source| {
            TurntableError::PersistFailure {
                path: self.output_path.clone(),
                source,
            }
        })?;

        info!(
            "Persisted {} tracks to {}",
            self.tracks.len(),
            self.output_path.display()
        );
        self.persisted = true;
        Ok(())
    }

    /// Whether a successful persist has already happened
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Number of tracks in the working set, base copies included
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the working set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of tracks captured beyond the base library
    #[must_use]
    pub fn new_track_count(&self) -> usize {
        self.tracks.len() - self.base_tracks.len()
    }

    /// Where the recording will be written
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Request, Response};
    use hyper::Uri;
    use tempfile::TempDir;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn track(method: &str, url: &str, body: &'static [u8]) -> Track {
        Track::capture(
            Request::new(method, uri(url)),
            Response::new(uri(url), 200).with_body(body),
        )
    }

    #[test]
    fn test_add_appends_in_call_order() {
        let dir = TempDir::new().unwrap();
        let mut recorder = Recorder::empty(dir.path().join("out.json"));

        recorder.add(track("GET", "http://x.com/a", b"a"));
        recorder.add(track("GET", "http://x.com/b", b"b"));

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.new_track_count(), 2);
    }

    #[test]
    fn test_add_skips_url_already_in_base() {
        let dir = TempDir::new().unwrap();
        let base = TrackLibrary::from_tracks(vec![track("GET", "http://x.com/a", b"base")]);
        let mut recorder = Recorder::new(Arc::new(base), dir.path().join("out.json"));

        recorder.add(track("GET", "http://x.com/a", b"live"));
        assert_eq!(recorder.new_track_count(), 0);

        recorder.add(track("GET", "http://x.com/b", b"live"));
        assert_eq!(recorder.new_track_count(), 1);
    }

    #[test]
    fn test_dedup_compares_url_only() {
        let dir = TempDir::new().unwrap();
        let base = TrackLibrary::from_tracks(vec![track("GET", "http://x.com/a", b"base")]);
        let mut recorder = Recorder::new(Arc::new(base), dir.path().join("out.json"));

        // Same URL with a different method still collapses
        recorder.add(track("POST", "http://x.com/a", b"live"));
        assert_eq!(recorder.new_track_count(), 0);
    }

    #[test]
    fn test_working_set_starts_as_base_copy() {
        let dir = TempDir::new().unwrap();
        let base = TrackLibrary::from_tracks(vec![track("GET", "http://x.com/a", b"base")]);
        let recorder = Recorder::new(Arc::new(base), dir.path().join("out.json"));

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.new_track_count(), 0);
    }

    #[test]
    fn test_persist_round_trips_through_codec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut recorder = Recorder::empty(path.clone());

        recorder.add(track("GET", "http://x.com/a", b"live"));
        recorder.persist().unwrap();
        assert!(recorder.is_persisted());

        let library = FixtureCodec::new().decode_file(&path).unwrap();
        assert_eq!(library.len(), 1);
        let replayed = library.get(0).unwrap();
        assert_eq!(replayed.request.url().to_string(), "http://x.com/a");
        assert_eq!(replayed.response.status(), 200);
    }

    #[test]
    fn test_persist_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut recorder = Recorder::empty(dir.path().join("out.json"));

        recorder.add(track("GET", "http://x.com/a", b"live"));
        recorder.persist().unwrap();
        recorder.persist().unwrap();
    }

    #[test]
    fn test_persist_unwritable_location_fails() {
        let mut recorder = Recorder::empty(PathBuf::from("/nonexistent/dir/out.json"));

        let err = recorder.persist().unwrap_err();
        assert!(matches!(err, TurntableError::PersistFailure { .. }));
        assert!(!recorder.is_persisted());
    }
}
