//! Fixture codec: persisted JSON documents to and from tracks
//!
//! A fixture is either a bare JSON array of interaction objects or an object
//! with the array nested under an `interactions` key; both shapes decode
//! identically. Encoding always produces the nested shape.
//!
//! Body payloads are stored as JSON strings. The owning side's
//! `Content-Type` header decides the representation: textual content types
//! (and absent ones) store the raw text, anything else stores base64. The
//! same rule drives decoding, so no external hint is needed to round-trip.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::track::{header_value, Request, Response, Track, TrackLibrary};
use crate::{Result, TurntableError};

/// Codec between fixture documents and in-memory tracks
#[derive(Debug, Clone, Default)]
pub struct FixtureCodec {
    assets_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct FixtureDocument {
    interactions: Vec<InteractionDoc>,
}

#[derive(Serialize, Deserialize)]
struct InteractionDoc {
    request: RequestDoc,
    response: ResponseDoc,
}

#[derive(Serialize, Deserialize)]
struct RequestDoc {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ResponseDoc {
    url: String,
    #[serde(rename = "statusCode")]
    status_code: u16,
    headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FixtureCodec {
    /// Create a codec with no sidecar asset directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec resolving `file` body references against `dir`
    #[must_use]
    pub fn with_assets_dir(dir: PathBuf) -> Self {
        Self {
            assets_dir: Some(dir),
        }
    }

    /// Decode a fixture document into tracks
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::MalformedFixture`] if the document is not
    /// valid JSON, is not one of the two accepted container shapes, or any
    /// interaction is missing a required field. No partial result is
    /// produced.
    pub fn decode_document(&self, text: &str) -> Result<Vec<Track>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TurntableError::MalformedFixture(format!("invalid JSON: {e}")))?;

        let interactions = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("interactions") {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(TurntableError::MalformedFixture(
                        "\"interactions\" must be an array".to_string(),
                    ))
                }
                None => {
                    return Err(TurntableError::MalformedFixture(
                        "missing \"interactions\" key".to_string(),
                    ))
                }
            },
            _ => {
                return Err(TurntableError::MalformedFixture(
                    "fixture must be an array of interactions or an object with an \
                     \"interactions\" key"
                        .to_string(),
                ))
            }
        };

        let tracks = interactions
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                self.decode_interaction(item).map_err(|e| match e {
                    TurntableError::MalformedFixture(msg) => {
                        TurntableError::MalformedFixture(format!("interaction {index}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Decoded fixture with {} tracks", tracks.len());
        Ok(tracks)
    }

    /// Decode a fixture file into a track library
    ///
    /// `file` body references resolve against the fixture's directory unless
    /// an assets directory was configured explicitly.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or
    /// [`TurntableError::MalformedFixture`] if its content does not decode.
    pub fn decode_file(&self, path: &Path) -> Result<TrackLibrary> {
        let text = fs::read_to_string(path)?;
        let tracks = match (&self.assets_dir, path.parent()) {
            (None, Some(parent)) => {
                Self::with_assets_dir(parent.to_path_buf()).decode_document(&text)?
            }
            _ => self.decode_document(&text)?,
        };
        Ok(TrackLibrary::from_tracks(tracks))
    }

    /// Encode tracks into a fixture document. Total: encoding never fails,
    /// and the result decodes back to equivalent tracks.
    ///
    /// One lossy edge: a body whose `Content-Type` classifies as textual but
    /// whose bytes are not valid UTF-8 (a `text/*` payload in a legacy
    /// encoding, say) is stored with invalid sequences replaced by U+FFFD.
    /// Binary payloads are unaffected; they go through base64.
    #[must_use]
    pub fn encode_document(&self, tracks: &[Track]) -> String {
        let document = FixtureDocument {
            interactions: tracks.iter().map(encode_interaction).collect(),
        };
        serde_json::to_string_pretty(&document).expect("fixture document serializes to JSON")
    }

    fn decode_interaction(&self, value: Value) -> Result<Track> {
        let doc: InteractionDoc = serde_json::from_value(value)
            .map_err(|e| TurntableError::MalformedFixture(e.to_string()))?;

        let request_headers = header_list(doc.request.headers.unwrap_or_default());
        let request_url = parse_url(&doc.request.url, "request.url")?;
        let mut request = Request::new(
            doc.request.method.unwrap_or_else(|| "GET".to_string()),
            request_url,
        )
        .with_headers(request_headers.clone());
        if let Some(text) = doc.request.body {
            request = request.with_body(decode_body(&text, &request_headers)?);
        }

        let response_headers = header_list(doc.response.headers);
        let response_url = parse_url(&doc.response.url, "response.url")?;
        let mut response = Response::new(response_url, doc.response.status_code)
            .with_headers(response_headers.clone());
        let body = match (doc.response.body, doc.response.file) {
            (Some(text), _) => Some(decode_body(&text, &response_headers)?),
            (None, Some(file)) => Some(self.read_sidecar(&file)?),
            (None, None) => None,
        };
        if let Some(body) = body {
            response = response.with_body(body);
        }
        if let Some(error) = doc.response.error {
            response = response.with_error(error);
        }

        Ok(Track::capture(request, response))
    }

    fn read_sidecar(&self, file: &str) -> Result<Bytes> {
        let Some(dir) = &self.assets_dir else {
            return Err(TurntableError::MalformedFixture(format!(
                "body references sidecar file \"{file}\" but no assets directory is available"
            )));
        };
        let path = dir.join(file);
        let bytes = fs::read(&path).map_err(|e| {
            TurntableError::MalformedFixture(format!(
                "cannot read sidecar file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Bytes::from(bytes))
    }
}

fn parse_url(text: &str, field: &str) -> Result<Uri> {
    text.parse::<Uri>()
        .map_err(|e| TurntableError::MalformedFixture(format!("{field} \"{text}\": {e}")))
}

fn header_list(map: BTreeMap<String, String>) -> Vec<(String, String)> {
    map.into_iter().collect()
}

fn header_map(headers: &[(String, String)]) -> BTreeMap<String, String> {
    headers.iter().cloned().collect()
}

/// Textual unless the content type says otherwise. Absent content types
/// count as textual so hand-written fixtures stay plain JSON strings.
fn body_is_textual(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/")
        || ct.contains("json")
        || ct.contains("xml")
        || ct.contains("charset=")
        || ct.contains("x-www-form-urlencoded")
}

fn decode_body(text: &str, headers: &[(String, String)]) -> Result<Bytes> {
    if body_is_textual(header_value(headers, "Content-Type")) {
        Ok(Bytes::from(text.to_string()))
    } else {
        let bytes = BASE64
            .decode(text)
            .map_err(|e| TurntableError::MalformedFixture(format!("invalid base64 body: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}

fn encode_body(bytes: &Bytes, headers: &[(String, String)]) -> String {
    if body_is_textual(header_value(headers, "Content-Type")) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        BASE64.encode(bytes)
    }
}

fn encode_interaction(track: &Track) -> InteractionDoc {
    let request = &track.request;
    let response = &track.response;

    InteractionDoc {
        request: RequestDoc {
            url: request.url().to_string(),
            method: Some(request.method().to_string()),
            headers: if request.headers().is_empty() {
                None
            } else {
                Some(header_map(request.headers()))
            },
            body: request.body().map(|b| encode_body(b, request.headers())),
        },
        response: ResponseDoc {
            url: response.url().to_string(),
            status_code: response.status(),
            headers: header_map(response.headers()),
            body: response.body().map(|b| encode_body(b, response.headers())),
            file: None,
            error: response.error().map(str::to_string),
        },
    }
}
