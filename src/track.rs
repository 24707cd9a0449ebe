//! Request, response, and track data model

use bytes::Bytes;
use hyper::Uri;

/// An HTTP request as seen by the matcher chain. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: Uri,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request with the given method and absolute URL
    #[must_use]
    pub fn new(method: impl Into<String>, url: Uri) -> Self {
        Self {
            method: method.into(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a plain GET request
    #[must_use]
    pub fn get(url: Uri) -> Self {
        Self::new("GET", url)
    }

    /// Attach headers
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a body payload, replacing any existing one
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Absolute URL
    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// All headers, in insertion order
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Body payload, if any
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// A recorded HTTP response. Immutable once built.
#[derive(Debug, Clone)]
pub struct Response {
    url: Uri,
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    error: Option<String>,
}

impl Response {
    /// Create a response for the given URL and status code
    #[must_use]
    pub fn new(url: Uri, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            body: None,
            error: None,
        }
    }

    /// Attach headers
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a body payload
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a transport-level error message
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Response URL
    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// HTTP status code
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// All headers, in insertion order
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Body payload, if any
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Transport-level error, if the recorded interaction failed
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// One recorded request/response interaction
#[derive(Debug, Clone)]
pub struct Track {
    /// The recorded request
    pub request: Request,
    /// The recorded response
    pub response: Response,
}

impl Track {
    /// Pair a request with the response captured for it
    #[must_use]
    pub fn capture(request: Request, response: Response) -> Self {
        Self { request, response }
    }
}

/// An ordered, read-only sequence of tracks loaded for a session.
///
/// Insertion order is significant: playback returns the first matching
/// track, so two tracks with identical matchable fields resolve to the
/// earlier one.
#[derive(Debug, Clone, Default)]
pub struct TrackLibrary {
    tracks: Vec<Track>,
}

impl TrackLibrary {
    /// Build a library from tracks, preserving their order
    #[must_use]
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// An empty library
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A one-track library answering `url` with `status` and `body`
    #[must_use]
    pub fn single_track(url: Uri, status: u16, body: Option<Bytes>) -> Self {
        let request = Request::get(url.clone());
        let mut response = Response::new(url, status);
        if let Some(body) = body {
            response = response.with_body(body);
        }
        Self::from_tracks(vec![Track::capture(request, response)])
    }

    /// A one-track library answering `url` with a transport-level error
    #[must_use]
    pub fn error_track(url: Uri, status: u16, error: impl Into<String>) -> Self {
        let request = Request::get(url.clone());
        let response = Response::new(url, status).with_error(error);
        Self::from_tracks(vec![Track::capture(request, response)])
    }

    /// Number of tracks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the library holds no tracks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track at the given position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Iterate tracks in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// All tracks as a slice
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl<'a> IntoIterator for &'a TrackLibrary {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// Case-insensitive header lookup over an ordered header list
pub(crate) fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
