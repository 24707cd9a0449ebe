//! Session orchestration
//!
//! The [`Turntable`] owns the configuration, the player, and (when a
//! recording session is active) the recorder. It exposes the intercepted
//! request operations of the host networking API: callers hand it a request
//! and a completion callback and get back a task handle whose `resume`
//! triggers delivery.

mod task;
mod turntable;

pub use task::PlaybackTask;
pub use turntable::{Completion, Turntable};

use hyper::Uri;

use crate::track::{Request, Response};
use crate::TurntableError;

/// Response metadata handed to completion callbacks alongside the body
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Response URL
    pub url: Uri,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    pub(crate) fn from_response(response: &Response) -> Self {
        Self {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().to_vec(),
        }
    }
}

/// Error-handling collaborator for playback misses.
///
/// Policy lives outside the orchestrator: a handler may panic, record a
/// test assertion, or log and move on. The orchestrator only reports what
/// happened and whether unique playback was active, since that affects
/// whether a missing track is itself the condition under test.
pub trait MissHandler: Send + Sync {
    /// No recorded track matched the request and recording is not active
    fn on_track_not_found(&self, request: &Request, play_tracks_uniquely: bool);

    /// Playback failed for a reason other than a missing track
    fn on_unknown_error(&self, error: &TurntableError);
}

/// Default handler: a missed track is a test failure
pub struct PanicMissHandler;

impl MissHandler for PanicMissHandler {
    fn on_track_not_found(&self, request: &Request, play_tracks_uniquely: bool) {
        panic!(
            "no recorded track matches {} {} (unique playback: {play_tracks_uniquely})",
            request.method(),
            request.url()
        );
    }

    fn on_unknown_error(&self, error: &TurntableError) {
        panic!("unexpected playback failure: {error}");
    }
}
