//! Audit record types
//!
//! Each exchange with a peer yields one [`ExchangeRecord`]. When payload
//! auditing is enabled, outbound bodies of create/update/upload calls also
//! yield a [`PayloadRecord`]. Both serialize to one JSON line each.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timed HTTP exchange with a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// When the request was sent
    pub ts: DateTime<Utc>,
    pub peer_id: u64,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Raw response body length in bytes, as received
    pub response_size: usize,
    /// Milliseconds from send to response
    pub duration_ms: u64,
    /// Encoding applied to the request body, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_encoding: Option<String>,
    /// `Content-Encoding` of the response, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_encoding: Option<String>,
}

impl ExchangeRecord {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Single-line access-log form:
    /// `[2024-05-01 10:00:00] "POST url" 200 512 0.042 br`
    pub fn to_access_line(&self) -> String {
        format!(
            "[{}] \"{} {}\" {} {} {:.3} {}",
            self.ts.format("%Y-%m-%d %H:%M:%S"),
            self.method,
            self.url,
            self.status,
            self.response_size,
            self.duration_ms as f64 / 1000.0,
            self.response_encoding.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }

    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outbound payload captured for debugging a sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRecord {
    pub ts: DateTime<Utc>,
    pub peer_id: u64,
    /// Human-readable description, e.g. `Pushing Event #12 to Server #3`
    pub message: String,
    /// Uncompressed JSON body
    pub payload: String,
}

impl PayloadRecord {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
