//! Request matching strategies
//!
//! A matcher chain is an AND over a set of field matchers, optionally
//! followed by a consume-once availability check. Field matchers are pure;
//! consumption is committed separately by the caller, and only for the
//! track the whole chain agreed on.

use std::borrow::Cow;
use std::collections::HashSet;

use hyper::Uri;
use serde_json::Value;

use crate::config::{RequestField, TurntableConfig};
use crate::track::{Request, Track};

/// A single-field request matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatcher {
    /// HTTP method, case-insensitive
    Method,
    /// Scheme, host, port, and path compared literally; query compared as
    /// an unordered multiset of decoded key/value pairs
    Url,
    /// Header names compared case-insensitively; `exact` requires the sets
    /// to be equal, otherwise the recorded headers must be a subset of the
    /// incoming ones
    Headers {
        /// Require set equality instead of subset containment
        exact: bool,
    },
    /// Byte-exact, or structurally equal when both payloads parse as JSON
    Body,
}

impl FieldMatcher {
    /// Whether the incoming request matches the candidate track on this field
    #[must_use]
    pub fn matches(&self, request: &Request, track: &Track) -> bool {
        match self {
            Self::Method => request
                .method()
                .eq_ignore_ascii_case(track.request.method()),
            Self::Url => urls_match(request.url(), track.request.url()),
            Self::Headers { exact } => {
                headers_match(request.headers(), track.request.headers(), *exact)
            }
            Self::Body => bodies_match(
                request.body().map_or(&[][..], |b| &b[..]),
                track.request.body().map_or(&[][..], |b| &b[..]),
            ),
        }
    }
}

/// Consumed-track bookkeeping for unique playback.
///
/// Tracks are keyed by their library position, so duplicate interactions
/// never alias. The set only grows; it is never reset mid-session.
#[derive(Debug, Default)]
pub struct UniqueTracker {
    consumed: HashSet<usize>,
}

impl UniqueTracker {
    /// Fresh tracker with every track available
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the track at `index` is still available
    #[must_use]
    pub fn is_available(&self, index: usize) -> bool {
        !self.consumed.contains(&index)
    }

    /// Mark the track at `index` as consumed
    pub fn consume(&mut self, index: usize) {
        self.consumed.insert(index);
    }

    /// Number of consumed tracks
    #[must_use]
    pub fn consumed_count(&self) -> usize {
        self.consumed.len()
    }
}

/// The configured matcher chain: all field matchers must agree, then the
/// availability check (when unique playback is on) runs last
#[derive(Debug, Default)]
pub struct MatcherChain {
    fields: Vec<FieldMatcher>,
    unique: Option<UniqueTracker>,
}

impl MatcherChain {
    /// Build a chain from explicit field matchers
    #[must_use]
    pub fn new(fields: Vec<FieldMatcher>, play_tracks_uniquely: bool) -> Self {
        Self {
            fields,
            unique: play_tracks_uniquely.then(UniqueTracker::new),
        }
    }

    /// Build the chain a configuration selects
    #[must_use]
    pub fn from_config(config: &TurntableConfig) -> Self {
        let fields = config
            .matched_fields
            .iter()
            .map(|field| match field {
                RequestField::Method => FieldMatcher::Method,
                RequestField::Url => FieldMatcher::Url,
                RequestField::Headers => FieldMatcher::Headers {
                    exact: config.exact_headers,
                },
                RequestField::Body => FieldMatcher::Body,
            })
            .collect();
        Self::new(fields, config.play_tracks_uniquely)
    }

    /// Evaluate the full chain against the track at `index`. Pure: no
    /// consumption happens here.
    #[must_use]
    pub fn matches(&self, request: &Request, track: &Track, index: usize) -> bool {
        self.fields.iter().all(|m| m.matches(request, track))
            && self.unique.as_ref().map_or(true, |u| u.is_available(index))
    }

    /// Commit consumption of the winning track. Call only after the chain
    /// agreed on `index`.
    pub fn commit(&mut self, index: usize) {
        if let Some(unique) = self.unique.as_mut() {
            unique.consume(index);
        }
    }

    /// Whether consume-once playback is active
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique.is_some()
    }
}

fn urls_match(a: &Uri, b: &Uri) -> bool {
    a.scheme_str() == b.scheme_str()
        && hosts_match(a.host(), b.host())
        && a.port_u16() == b.port_u16()
        && a.path() == b.path()
        && query_pairs(a.query()) == query_pairs(b.query())
}

fn hosts_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Decoded query pairs, sorted so parameter order never affects matching
fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query
        .unwrap_or("")
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect();
    pairs.sort();
    pairs
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

fn headers_match(incoming: &[(String, String)], recorded: &[(String, String)], exact: bool) -> bool {
    let incoming = normalized_headers(incoming);
    let recorded = normalized_headers(recorded);

    if exact {
        incoming == recorded
    } else {
        recorded.iter().all(|pair| incoming.contains(pair))
    }
}

fn normalized_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut normalized: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect();
    normalized.sort();
    normalized
}

fn bodies_match(a: &[u8], b: &[u8]) -> bool {
    if a == b {
        return true;
    }
    // Structural comparison when both sides are JSON: key order and
    // whitespace differences do not break the match.
    match (
        serde_json::from_slice::<Value>(a),
        serde_json::from_slice::<Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
