//! Abstract HTTP capability used to talk to peers
//!
//! The core never opens sockets itself. Callers hand a [`SyncTransport`]
//! an implementation of [`HttpClient`] that owns connection pooling, TLS,
//! proxies, timeouts and cancellation. The core only builds
//! [`HttpRequest`] values and interprets [`HttpResponse`] values.
//!
//! [`SyncTransport`]: crate::sync::SyncTransport

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Header names used by the sync protocol
pub mod header {
    pub const ACCEPT: &str = "Accept";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ETAG: &str = "ETag";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const LOCATION: &str = "Location";
    pub const USER_AGENT: &str = "User-Agent";
    /// Detached signature over the uncompressed body of a protected payload
    pub const SIGNATURE: &str = "x-pgp-signature";
}

/// HTTP methods issued against a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, case-insensitive header list
pub type Headers = Vec<(String, String)>;

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// A fully built request, ready to be sent by an [`HttpClient`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Raw response as returned by the HTTP layer
///
/// The body is kept exactly as received, possibly still compressed. Use
/// [`crate::sync::SyncResponse`] to decode it.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Response with no headers and an empty body
    pub fn status_only(status: u16) -> Self {
        Self::new(status, Vec::new(), Bytes::new())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of the HTTP layer itself (no response available)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The exchange was cancelled by the caller's cancellation mechanism
    #[error("request cancelled")]
    Cancelled,

    /// Connection, TLS, timeout or any other network failure
    #[error("{0}")]
    Failed(String),
}

/// The HTTP capability the sync core depends on
///
/// Implementations must not follow redirects on `POST` (the push protocol
/// reads `Location` from 404 responses) and must not decompress bodies
/// on their own; content decoding is done by the core.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
