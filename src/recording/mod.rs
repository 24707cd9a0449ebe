//! Capture of live interactions for later replay
//!
//! The [`Recorder`] accumulates tracks observed during a recording session
//! and persists them as a fixture document at session teardown.

mod recorder;

pub use recorder::Recorder;
