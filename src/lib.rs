//! Turntable - HTTP record/replay test double
//!
//! Intercepts outgoing HTTP requests made by code under test and answers
//! them from a library of previously captured interactions, keeping test
//! runs deterministic and network-free. When a recording mode is enabled,
//! requests that miss the library fall through to the real network and the
//! observed interaction is appended to the fixture for future replay.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod deck;
pub mod error;
pub mod fixture;
pub mod matching;
pub mod network;
pub mod recording;
pub mod replay;
pub mod track;

pub use config::{RecordingMode, RequestField, TurntableConfig};
pub use deck::{MissHandler, PanicMissHandler, PlaybackTask, ResponseMetadata, Turntable};
pub use error::{Result, TurntableError};
pub use fixture::FixtureCodec;
pub use matching::{FieldMatcher, MatcherChain};
pub use network::{NetworkClient, RequestExecutor, TransportError};
pub use recording::Recorder;
pub use replay::Player;
pub use track::{Request, Response, Track, TrackLibrary};
