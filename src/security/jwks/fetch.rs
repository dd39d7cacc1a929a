//! Key-set retrieval.
//!
//! [`KeySource`] is the seam between the cache and the network. The
//! production source is [`HttpKeySource`]; tests plug in in-memory sources.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest key-set document accepted, in bytes.
pub const MAX_DOCUMENT_BYTES: u64 = 64 * 1024;

/// Default bound on a whole key-set request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the key set could not be retrieved.
#[derive(Debug, Error)]
pub enum KeySourceError {
    /// Connection, TLS or protocol failure.
    #[error("key set request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The request did not finish within the configured timeout.
    #[error("key set request timed out")]
    Timeout,
    /// The endpoint answered with a non-success status.
    #[error("key set endpoint returned HTTP {0}")]
    Status(u16),
    /// The document exceeds [`MAX_DOCUMENT_BYTES`].
    #[error("key set document exceeds {MAX_DOCUMENT_BYTES} bytes")]
    TooLarge,
    /// Reading the response body failed.
    #[error("reading key set document failed: {0}")]
    Read(#[source] std::io::Error),
    /// The body is not a `{"keys": [...]}` JSON document.
    #[error("key set document is malformed: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The source cannot serve keys at all.
    #[error("key set source unavailable: {0}")]
    Unavailable(String),
}

/// Somewhere the issuer's key set can be fetched from.
pub trait KeySource: Send + Sync {
    /// Fetch the current key-set document. Called without any cache lock held.
    fn fetch(&self) -> Result<JwkSet, KeySourceError>;

    /// Short description used in logs.
    fn describe(&self) -> String {
        "key source".to_string()
    }
}

impl<T: KeySource + ?Sized> KeySource for std::sync::Arc<T> {
    fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Parse a key-set document.
///
/// The outer shape must be valid. Entries that are not JWKs this crate can
/// represent are logged and left out, so one exotic key does not hide the
/// others.
pub fn parse_key_set(body: &[u8]) -> Result<JwkSet, KeySourceError> {
    let raw: RawKeySet = serde_json::from_slice(body).map_err(KeySourceError::Malformed)?;
    let mut keys = Vec::with_capacity(raw.keys.len());
    for (index, entry) in raw.keys.into_iter().enumerate() {
        match serde_json::from_value::<Jwk>(entry) {
            Ok(jwk) => keys.push(jwk),
            Err(e) => warn!(index, error = %e, "skipping undecodable key set entry"),
        }
    }
    Ok(JwkSet { keys })
}

/// Fetches the key set with a blocking HTTP GET.
pub struct HttpKeySource {
    url: String,
    client: Client,
}

impl HttpKeySource {
    /// Create a source for `url` whose requests are bounded by `timeout`.
    ///
    /// The URL is not checked here; configuration validation enforces HTTPS.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeySourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("clinic-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(KeySourceError::Transport)?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Endpoint this source reads from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeySource for HttpKeySource {
    fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_DOCUMENT_BYTES)
        {
            return Err(KeySourceError::TooLarge);
        }

        // One byte past the limit tells an oversized chunked body apart
        let mut body = Vec::new();
        response
            .take(MAX_DOCUMENT_BYTES + 1)
            .read_to_end(&mut body)
            .map_err(|e| match e.get_ref().and_then(|inner| inner.downcast_ref::<reqwest::Error>()) {
                Some(inner) if inner.is_timeout() => KeySourceError::Timeout,
                _ => KeySourceError::Read(e),
            })?;
        if body.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(KeySourceError::TooLarge);
        }
        debug!(url = %self.url, bytes = body.len(), "fetched key set document");

        parse_key_set(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

fn classify(error: reqwest::Error) -> KeySourceError {
    if error.is_timeout() {
        KeySourceError::Timeout
    } else {
        KeySourceError::Transport(error)
    }
}
