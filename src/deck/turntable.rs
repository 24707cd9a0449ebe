//! The session orchestrator state machine

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{error, info, warn};

use super::task::{CompletionQueue, Delivery, PlaybackTask};
use super::{MissHandler, PanicMissHandler, ResponseMetadata};
use crate::config::{RecordingMode, TurntableConfig};
use crate::fixture::FixtureCodec;
use crate::matching::MatcherChain;
use crate::network::{NetworkClient, RequestExecutor, TransportError};
use crate::recording::Recorder;
use crate::replay::Player;
use crate::track::{Request, Response, Track, TrackLibrary};
use crate::{Result, TurntableError};

/// Completion callback shape of the impersonated networking API
pub type Completion =
    Box<dyn FnOnce(Option<Bytes>, Option<ResponseMetadata>, Option<TransportError>) + Send + 'static>;

/// The active player/recorder pair; replaced wholesale on `load_*`
struct Deck {
    player: Player,
    recorder: Option<Recorder>,
}

/// What the hot path decided under the deck lock
enum Outcome {
    Hit(Response),
    RecordFallback,
    Miss(TurntableError),
}

/// HTTP record/replay session orchestrator.
///
/// Answers intercepted requests from a track library; on a miss it either
/// forwards to the real network and records the interaction (when a
/// recording session is active) or reports the miss to the configured
/// handler. Construction requires a running tokio runtime, which hosts the
/// completion delivery worker.
pub struct Turntable {
    config: TurntableConfig,
    deck: Arc<Mutex<Deck>>,
    executor: Arc<dyn RequestExecutor>,
    miss_handler: Arc<dyn MissHandler>,
    queue: CompletionQueue,
}

enum LibrarySource {
    Library(TrackLibrary),
    Fixture(PathBuf),
}

impl std::fmt::Debug for Turntable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turntable")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Turntable {
    /// Create a turntable over an explicit track library
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::ConfigError`] when the configuration
    /// requires an output path that is neither configured nor derivable.
    pub fn with_library(library: TrackLibrary, config: TurntableConfig) -> Result<Self> {
        let deck = build_deck(&config, LibrarySource::Library(library))?;
        Ok(Self::assemble(config, deck))
    }

    /// Create a turntable from a fixture file, evaluated per the recording
    /// mode
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::MalformedFixture`] when the fixture does
    /// not decode, an I/O error when it cannot be read, or
    /// [`TurntableError::ConfigError`] when `RecordIfTracksMissing` is
    /// selected and the fixture is absent.
    pub fn with_fixture(path: impl AsRef<std::path::Path>, config: TurntableConfig) -> Result<Self> {
        let deck = build_deck(&config, LibrarySource::Fixture(path.as_ref().to_path_buf()))?;
        Ok(Self::assemble(config, deck))
    }

    fn assemble(config: TurntableConfig, deck: Deck) -> Self {
        Self {
            config,
            deck: Arc::new(Mutex::new(deck)),
            executor: Arc::new(NetworkClient::new()),
            miss_handler: Arc::new(PanicMissHandler),
            queue: CompletionQueue::new(),
        }
    }

    /// Replace the network collaborator used by the record-fallback path
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the miss-handling collaborator
    #[must_use]
    pub fn with_miss_handler(mut self, handler: Arc<dyn MissHandler>) -> Self {
        self.miss_handler = handler;
        self
    }

    /// Load a fixture file, replacing the active player and recorder
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Turntable::with_fixture`].
    pub fn load_fixture(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let deck = build_deck(&self.config, LibrarySource::Fixture(path.as_ref().to_path_buf()))?;
        self.replace_deck(deck);
        Ok(())
    }

    /// Load an explicit library, replacing the active player and recorder
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Turntable::with_library`].
    pub fn load_library(&self, library: TrackLibrary) -> Result<()> {
        let deck = build_deck(&self.config, LibrarySource::Library(library))?;
        self.replace_deck(deck);
        Ok(())
    }

    /// Intercept a plain request
    pub fn data_task<F>(&self, request: Request, completion: F) -> PlaybackTask
    where
        F: FnOnce(Option<Bytes>, Option<ResponseMetadata>, Option<TransportError>)
            + Send
            + 'static,
    {
        self.task_for(request, Box::new(completion))
    }

    /// Intercept an upload-style request, attaching `body` before matching
    /// and before any forwarding
    pub fn upload_task<F>(&self, request: Request, body: Bytes, completion: F) -> PlaybackTask
    where
        F: FnOnce(Option<Bytes>, Option<ResponseMetadata>, Option<TransportError>)
            + Send
            + 'static,
    {
        self.task_for(request.with_body(body), Box::new(completion))
    }

    /// Persist the active recording session, if any. Idempotent; a call
    /// without an active session does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::PersistFailure`] when the recording cannot
    /// be written. This is fatal for the session: silent loss of a
    /// recording defeats the feature's purpose.
    pub fn stop_recording(&self) -> Result<()> {
        let mut deck = self.lock_deck();
        if let Some(recorder) = deck.recorder.as_mut() {
            recorder.persist()?;
        }
        Ok(())
    }

    /// Whether a record-fallback session is active
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.lock_deck().recorder.is_some()
    }

    /// The configuration this turntable was built with
    #[must_use]
    pub fn config(&self) -> &TurntableConfig {
        &self.config
    }

    fn task_for(&self, request: Request, completion: Completion) -> PlaybackTask {
        let outcome = {
            let mut deck = self.lock_deck();
            match deck.player.play_track(&request) {
                Ok(response) => Outcome::Hit(response),
                Err(err) if err.is_track_not_found() && deck.recorder.is_some() => {
                    Outcome::RecordFallback
                }
                Err(err) => Outcome::Miss(err),
            }
        };

        match outcome {
            Outcome::Hit(response) => {
                let queue = self.queue.clone();
                PlaybackTask::new(Box::new(move || {
                    queue.schedule(deliver(completion, response));
                }))
            }
            Outcome::RecordFallback => {
                let queue = self.queue.clone();
                let executor = Arc::clone(&self.executor);
                let deck = Arc::clone(&self.deck);
                PlaybackTask::new(Box::new(move || {
                    tokio::spawn(async move {
                        match executor.execute(&request).await {
                            Ok(response) => {
                                {
                                    let mut deck = deck.lock().expect("deck lock poisoned");
                                    if let Some(recorder) = deck.recorder.as_mut() {
                                        recorder.add(Track::capture(request, response.clone()));
                                    }
                                }
                                queue.schedule(deliver(completion, response));
                            }
                            // Forwarding failures pass through verbatim and
                            // record nothing
                            Err(transport_error) => {
                                queue.schedule(Box::new(move || {
                                    completion(None, None, Some(transport_error));
                                }));
                            }
                        }
                    });
                }))
            }
            Outcome::Miss(err) => {
                match &err {
                    TurntableError::TrackNotFound { .. } => {
                        self.miss_handler
                            .on_track_not_found(&request, self.config.play_tracks_uniquely);
                    }
                    other => self.miss_handler.on_unknown_error(other),
                }
                PlaybackTask::noop()
            }
        }
    }

    fn replace_deck(&self, deck: Deck) {
        let mut guard = self.lock_deck();
        if let Some(old) = guard.recorder.as_ref() {
            if !old.is_persisted() && old.new_track_count() > 0 {
                warn!(
                    "Replacing active recorder with {} unpersisted tracks",
                    old.new_track_count()
                );
            }
        }
        *guard = deck;
    }

    fn lock_deck(&self) -> MutexGuard<'_, Deck> {
        self.deck.lock().expect("deck lock poisoned")
    }
}

impl Drop for Turntable {
    fn drop(&mut self) {
        let Ok(mut deck) = self.deck.lock() else {
            return;
        };
        let Some(recorder) = deck.recorder.as_mut() else {
            return;
        };
        if recorder.is_persisted() {
            return;
        }
        if let Err(persist_error) = recorder.persist() {
            if std::thread::panicking() {
                error!("Recording lost at teardown: {persist_error}");
            } else {
                panic!("recording lost at teardown: {persist_error}");
            }
        }
    }
}

fn deliver(completion: Completion, response: Response) -> Delivery {
    Box::new(move || {
        let metadata = ResponseMetadata::from_response(&response);
        let transport_error = response.error().map(TransportError::new);
        let body = response.body().cloned();
        completion(body, Some(metadata), transport_error);
    })
}

fn build_deck(config: &TurntableConfig, source: LibrarySource) -> Result<Deck> {
    let codec = FixtureCodec::new();

    let (library, recorder) = match (config.recording_mode, source) {
        (RecordingMode::Disabled, LibrarySource::Library(library)) => (Arc::new(library), None),
        (RecordingMode::Disabled, LibrarySource::Fixture(path)) => {
            (Arc::new(codec.decode_file(&path)?), None)
        }
        // A library handed over directly counts as a present fixture
        (RecordingMode::RecordIfFixtureMissing, LibrarySource::Library(library)) => {
            (Arc::new(library), None)
        }
        (RecordingMode::RecordIfFixtureMissing, LibrarySource::Fixture(path)) => {
            if path.exists() {
                (Arc::new(codec.decode_file(&path)?), None)
            } else {
                info!(
                    "Fixture {} absent; recording every request this session",
                    path.display()
                );
                let output = output_path(config, Some(&path))?;
                let library = Arc::new(TrackLibrary::empty());
                let recorder = Recorder::new(Arc::clone(&library), output);
                (library, Some(recorder))
            }
        }
        (RecordingMode::RecordIfTracksMissing, LibrarySource::Fixture(path)) => {
            if !path.exists() {
                return Err(TurntableError::ConfigError(format!(
                    "recording mode record_if_tracks_missing requires fixture {} to exist",
                    path.display()
                )));
            }
            let library = Arc::new(codec.decode_file(&path)?);
            let output = output_path(config, Some(&path))?;
            let recorder = Recorder::new(Arc::clone(&library), output);
            (library, Some(recorder))
        }
        (RecordingMode::RecordIfTracksMissing, LibrarySource::Library(library)) => {
            let library = Arc::new(library);
            let output = output_path(config, None)?;
            let recorder = Recorder::new(Arc::clone(&library), output);
            (library, Some(recorder))
        }
    };

    let player = Player::new(library, MatcherChain::from_config(config));
    Ok(Deck { player, recorder })
}

fn output_path(config: &TurntableConfig, fixture: Option<&std::path::Path>) -> Result<PathBuf> {
    config
        .recording_path
        .clone()
        .or_else(|| fixture.map(std::path::Path::to_path_buf))
        .ok_or_else(|| {
            TurntableError::ConfigError(
                "recording requires recording_path when no fixture path is given".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestField;
    use async_trait::async_trait;
    use hyper::Uri;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn single_track_library() -> TrackLibrary {
        TrackLibrary::single_track(uri("http://x.com/a"), 200, Some(Bytes::from("ok")))
    }

    struct FakeExecutor {
        body: &'static str,
        calls: AtomicUsize,
    }

    impl FakeExecutor {
        fn new(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RequestExecutor for FakeExecutor {
        async fn execute(
            &self,
            request: &Request,
        ) -> std::result::Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(request.url().clone(), 200)
                .with_body(Bytes::from(self.body)))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl RequestExecutor for FailingExecutor {
        async fn execute(
            &self,
            _request: &Request,
        ) -> std::result::Result<Response, TransportError> {
            Err(TransportError::new("connection refused"))
        }
    }

    #[derive(Default)]
    struct CountingMissHandler {
        not_found: AtomicUsize,
    }

    impl MissHandler for CountingMissHandler {
        fn on_track_not_found(&self, _request: &Request, _play_tracks_uniquely: bool) {
            self.not_found.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unknown_error(&self, _error: &TurntableError) {}
    }

    type Delivered = (Option<Bytes>, Option<u16>, Option<String>);

    fn capture() -> (
        impl FnOnce(Option<Bytes>, Option<ResponseMetadata>, Option<TransportError>) + Send,
        oneshot::Receiver<Delivered>,
    ) {
        let (tx, rx) = oneshot::channel();
        let completion = move |body, metadata: Option<ResponseMetadata>, error: Option<TransportError>| {
            let _ = tx.send((body, metadata.map(|m| m.status), error.map(|e| e.message)));
        };
        (completion, rx)
    }

    #[tokio::test]
    async fn test_playback_hit_delivers_stored_response() {
        let turntable =
            Turntable::with_library(single_track_library(), TurntableConfig::default()).unwrap();

        let (completion, rx) = capture();
        let task = turntable.data_task(Request::get(uri("http://x.com/a")), completion);
        task.resume();

        let (body, status, error) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("ok")));
        assert_eq!(status, Some(200));
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_completion_is_never_inline() {
        let turntable =
            Turntable::with_library(single_track_library(), TurntableConfig::default()).unwrap();

        let (tx, rx) = oneshot::channel();
        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = Arc::clone(&delivered);
        let task = turntable.data_task(Request::get(uri("http://x.com/a")), move |_, _, _| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });

        // Nothing is delivered from within registration or resume itself;
        // the queue worker runs only once this task yields
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        task.resume();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        rx.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_playback_only_miss_reports_to_handler() {
        let handler = Arc::new(CountingMissHandler::default());
        let turntable =
            Turntable::with_library(single_track_library(), TurntableConfig::default())
                .unwrap()
                .with_miss_handler(Arc::clone(&handler) as Arc<dyn MissHandler>);

        let task = turntable.data_task(Request::get(uri("http://x.com/b")), |_, _, _| {});
        task.resume();

        assert_eq!(handler.not_found.load(Ordering::SeqCst), 1);
        assert!(!turntable.is_recording());
    }

    #[tokio::test]
    async fn test_record_if_fixture_missing_records_everything() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("session.json");
        let executor = FakeExecutor::new("live");

        let config =
            TurntableConfig::default().with_mode(RecordingMode::RecordIfFixtureMissing);
        let turntable = Turntable::with_fixture(&fixture_path, config)
            .unwrap()
            .with_executor(Arc::clone(&executor) as Arc<dyn RequestExecutor>);

        assert!(turntable.is_recording());

        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/a")), completion)
            .resume();

        let (body, status, error) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("live")));
        assert_eq!(status, Some(200));
        assert!(error.is_none());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        turntable.stop_recording().unwrap();

        let library = FixtureCodec::new().decode_file(&fixture_path).unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(
            library.get(0).unwrap().request.url().to_string(),
            "http://x.com/a"
        );
    }

    #[tokio::test]
    async fn test_record_if_fixture_missing_with_present_fixture_plays_back() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("session.json");
        std::fs::write(
            &fixture_path,
            FixtureCodec::new().encode_document(single_track_library().tracks()),
        )
        .unwrap();

        let config =
            TurntableConfig::default().with_mode(RecordingMode::RecordIfFixtureMissing);
        let turntable = Turntable::with_fixture(&fixture_path, config).unwrap();

        assert!(!turntable.is_recording());

        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/a")), completion)
            .resume();

        let (body, _, _) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("ok")));
    }

    #[tokio::test]
    async fn test_record_if_tracks_missing_requires_fixture() {
        let dir = TempDir::new().unwrap();
        let config = TurntableConfig::default().with_mode(RecordingMode::RecordIfTracksMissing);

        let err = Turntable::with_fixture(dir.path().join("absent.json"), config).unwrap_err();
        assert!(matches!(err, TurntableError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_record_if_tracks_missing_records_only_misses() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("session.json");
        let output_path = dir.path().join("out.json");
        std::fs::write(
            &fixture_path,
            FixtureCodec::new().encode_document(single_track_library().tracks()),
        )
        .unwrap();
        let executor = FakeExecutor::new("live");

        let config = TurntableConfig::default()
            .with_mode(RecordingMode::RecordIfTracksMissing)
            .with_recording_path(output_path.clone());
        let turntable = Turntable::with_fixture(&fixture_path, config)
            .unwrap()
            .with_executor(Arc::clone(&executor) as Arc<dyn RequestExecutor>);

        // Hit: answered from the library, no network call
        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/a")), completion)
            .resume();
        let (body, _, _) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("ok")));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

        // Miss: forwarded and captured
        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/b")), completion)
            .resume();
        let (body, _, _) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("live")));

        turntable.stop_recording().unwrap();

        // The persisted fixture holds the base copy plus the new capture
        let persisted = FixtureCodec::new().decode_file(&output_path).unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[tokio::test]
    async fn test_executor_error_passes_through_and_records_nothing() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("session.json");

        let config =
            TurntableConfig::default().with_mode(RecordingMode::RecordIfFixtureMissing);
        let turntable = Turntable::with_fixture(&fixture_path, config)
            .unwrap()
            .with_executor(Arc::new(FailingExecutor));

        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/a")), completion)
            .resume();

        let (body, status, error) = rx.await.unwrap();
        assert!(body.is_none());
        assert!(status.is_none());
        assert_eq!(error.as_deref(), Some("connection refused"));

        turntable.stop_recording().unwrap();
        let persisted = FixtureCodec::new().decode_file(&fixture_path).unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn test_upload_task_matches_on_augmented_body() {
        let url = uri("http://x.com/upload");
        let recorded = Request::new("POST", url.clone()).with_body(&b"payload"[..]);
        let library = TrackLibrary::from_tracks(vec![Track::capture(
            recorded,
            Response::new(url.clone(), 201).with_body(&b"created"[..]),
        )]);

        let config = TurntableConfig::matching_on(vec![
            RequestField::Method,
            RequestField::Url,
            RequestField::Body,
        ]);
        let turntable = Turntable::with_library(library, config).unwrap();

        let (completion, rx) = capture();
        turntable
            .upload_task(
                Request::new("POST", url),
                Bytes::from_static(b"payload"),
                completion,
            )
            .resume();

        let (body, status, _) = rx.await.unwrap();
        assert_eq!(status, Some(201));
        assert_eq!(body, Some(Bytes::from("created")));
    }

    #[tokio::test]
    async fn test_load_fixture_replaces_active_player() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("other.json");
        let other = TrackLibrary::single_track(
            uri("http://x.com/other"),
            200,
            Some(Bytes::from("other")),
        );
        std::fs::write(
            &fixture_path,
            FixtureCodec::new().encode_document(other.tracks()),
        )
        .unwrap();

        let turntable =
            Turntable::with_library(single_track_library(), TurntableConfig::default()).unwrap();
        turntable.load_fixture(&fixture_path).unwrap();

        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/other")), completion)
            .resume();

        let (body, _, _) = rx.await.unwrap();
        assert_eq!(body, Some(Bytes::from("other")));
    }

    #[tokio::test]
    async fn test_unique_playback_consumes_across_requests() {
        let turntable = Turntable::with_library(
            single_track_library(),
            TurntableConfig::default().with_unique_playback(true),
        )
        .unwrap();
        let handler = Arc::new(CountingMissHandler::default());
        let turntable = turntable.with_miss_handler(Arc::clone(&handler) as Arc<dyn MissHandler>);

        let (completion, rx) = capture();
        turntable
            .data_task(Request::get(uri("http://x.com/a")), completion)
            .resume();
        assert!(rx.await.is_ok());

        // Second identical request: the only track is consumed
        turntable
            .data_task(Request::get(uri("http://x.com/a")), |_, _, _| {})
            .resume();
        assert_eq!(handler.not_found.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_persists_active_recording() {
        let dir = TempDir::new().unwrap();
        let fixture_path = dir.path().join("session.json");
        let executor = FakeExecutor::new("live");

        {
            let config =
                TurntableConfig::default().with_mode(RecordingMode::RecordIfFixtureMissing);
            let turntable = Turntable::with_fixture(&fixture_path, config)
                .unwrap()
                .with_executor(Arc::clone(&executor) as Arc<dyn RequestExecutor>);

            let (completion, rx) = capture();
            turntable
                .data_task(Request::get(uri("http://x.com/a")), completion)
                .resume();
            rx.await.unwrap();
        }

        let persisted = FixtureCodec::new().decode_file(&fixture_path).unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_recording_without_session_is_ok() {
        let turntable =
            Turntable::with_library(single_track_library(), TurntableConfig::default()).unwrap();
        turntable.stop_recording().unwrap();
    }
}
