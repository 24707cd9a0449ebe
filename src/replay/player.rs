//! First-match-wins track playback

use std::sync::Arc;

use tracing::{debug, warn};

use crate::matching::MatcherChain;
use crate::track::{Request, Response, TrackLibrary};
use crate::{Result, TurntableError};

/// Plays back recorded responses from a track library
pub struct Player {
    library: Arc<TrackLibrary>,
    chain: MatcherChain,
}

impl Player {
    /// Create a player over `library` with the given matcher chain
    #[must_use]
    pub fn new(library: Arc<TrackLibrary>, chain: MatcherChain) -> Self {
        Self { library, chain }
    }

    /// Find the first track matching `request` and return its response.
    ///
    /// The library is scanned in insertion order and never reordered. When
    /// unique playback is active the winning track, and only the winning
    /// track, is consumed as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::TrackNotFound`] when no track matches
    /// under the active matcher chain.
    pub fn play_track(&mut self, request: &Request) -> Result<Response> {
        for (index, track) in self.library.iter().enumerate() {
            if self.chain.matches(request, track, index) {
                self.chain.commit(index);
                debug!(
                    "Track hit: {} {} -> {} (index {})",
                    request.method(),
                    request.url(),
                    track.response.status(),
                    index
                );
                return Ok(track.response.clone());
            }
        }

        warn!("Track miss: {} {}", request.method(), request.url());
        Err(TurntableError::TrackNotFound {
            method: request.method().to_string(),
            url: request.url().to_string(),
        })
    }

    /// The library this player reads from
    #[must_use]
    pub fn library(&self) -> &TrackLibrary {
        &self.library
    }

    /// Whether consume-once playback is active
    #[must_use]
    pub fn plays_uniquely(&self) -> bool {
        self.chain.is_unique()
    }
}
