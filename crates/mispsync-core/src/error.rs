//! Error types for peer synchronization

use std::fmt;

use thiserror::Error;

use crate::http::{HttpResponse, Method, TransportError};
use crate::types::Capability;

/// Main error type for sync operations against a peer
///
/// Cloneable so that a failed capability probe can be replayed to every
/// later caller on the same connection.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Peer answered with a status that is not a success for this exchange
    #[error("{0}")]
    PeerHttp(Box<PeerHttpError>),

    /// Response body could not be decompressed or decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound payload could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// A feature required by the operation is missing on the peer
    #[error("Peer does not support {0}")]
    CapabilityUnavailable(Capability),

    /// The peer's info endpoint returned unusable data
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The underlying HTTP client cancelled the exchange
    #[error("Transport cancelled")]
    TransportCancelled,

    /// Network-level failure without an HTTP response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Invalid peer descriptor or configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audit sink failure (never raised from the transport itself)
    #[error("Audit error: {0}")]
    Audit(String),

    /// Local store rejected pulled records
    #[error("Store error: {0}")]
    Store(String),
}

impl SyncError {
    /// HTTP status carried by a [`SyncError::PeerHttp`] error
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::PeerHttp(err) => Some(err.status()),
            _ => None,
        }
    }

    /// Peer response carried by a [`SyncError::PeerHttp`] error
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            SyncError::PeerHttp(err) => Some(&err.response),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::TransportCancelled)
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => SyncError::TransportCancelled,
            TransportError::Failed(msg) => SyncError::Transport(msg),
        }
    }
}

impl From<PeerHttpError> for SyncError {
    fn from(err: PeerHttpError) -> Self {
        SyncError::PeerHttp(Box::new(err))
    }
}

/// Non-success HTTP exchange with a peer
///
/// Keeps the whole response so callers can inspect headers such as
/// `Location` after the fact.
#[derive(Debug, Clone)]
pub struct PeerHttpError {
    pub method: Method,
    pub url: String,
    pub response: HttpResponse,
}

impl PeerHttpError {
    pub fn new(method: Method, url: impl Into<String>, response: HttpResponse) -> Self {
        Self {
            method,
            url: url.into(),
            response,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }
}

impl fmt::Display for PeerHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Peer returned HTTP {} for {} {}",
            self.response.status, self.method, self.url
        )
    }
}

impl std::error::Error for PeerHttpError {}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
