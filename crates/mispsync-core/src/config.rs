//! Connection configuration
//!
//! Everything a [`SyncTransport`](crate::sync::SyncTransport) needs to know
//! beyond the peer itself lives here. The value is immutable once the
//! transport is built; there is no global configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Path of the peer's version/capability endpoint
pub const DEFAULT_INFO_PATH: &str = "/servers/getVersion";

/// Bodies at or below this many bytes are never compressed
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Immutable per-connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Relative path probed for the peer's version and capabilities
    pub info_path: String,
    /// Also hand outbound payloads of create/update/upload calls to the
    /// audit sink
    pub sync_audit: bool,
    /// Sent as `User-Agent` when set
    pub user_agent: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            info_path: DEFAULT_INFO_PATH.to_string(),
            sync_audit: false,
            user_agent: None,
        }
    }
}

impl SyncConfig {
    pub fn with_info_path(mut self, path: impl Into<String>) -> Self {
        self.info_path = path.into();
        self
    }

    pub fn with_sync_audit(mut self, enabled: bool) -> Self {
        self.sync_audit = enabled;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Fixed threshold, exposed for symmetry with the other settings
    pub fn compression_threshold(&self) -> usize {
        COMPRESSION_THRESHOLD
    }

    /// # Errors
    ///
    /// Returns `SyncError::Config` if the info path is not an absolute
    /// relative path (`/...`).
    pub fn validate(&self) -> SyncResult<()> {
        if !self.info_path.starts_with('/') {
            return Err(SyncError::Config(format!(
                "info_path must start with '/', got `{}`",
                self.info_path
            )));
        }
        Ok(())
    }
}
