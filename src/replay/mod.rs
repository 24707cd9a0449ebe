//! Playback of recorded tracks
//!
//! The [`Player`] answers incoming requests from a read-only track library
//! using the configured matcher chain, first match wins.

mod player;

pub use player::Player;
