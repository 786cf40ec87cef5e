//! Peer descriptor types
//!
//! A [`PeerDescriptor`] is created once per sync session by the caller and
//! never mutated by the core. It names the remote instance, carries the
//! credential sent with every request and the rule sets the caller's
//! eligibility layer uses to pre-filter records.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Opaque credential sent as the `Authorization` header
///
/// The value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthKey(String);

impl AuthKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(****)")
    }
}

/// Pull or push rule set as configured on the local side
///
/// Opaque to the core; kept so that callers can hand it back to their
/// eligibility layer or turn it into index filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRules(pub Value);

impl SyncRules {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Immutable description of the remote instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Local numeric id of the peer entry
    pub id: u64,
    /// Display name
    pub name: String,
    /// Base URL, every request path is appended to it
    pub url: Url,
    pub auth_key: AuthKey,
    #[serde(default)]
    pub pull_rules: SyncRules,
    #[serde(default)]
    pub push_rules: SyncRules,
}

impl PeerDescriptor {
    /// Create a descriptor, validating the base URL
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the URL does not parse or is not
    /// an http(s) URL.
    pub fn new(
        id: u64,
        name: impl Into<String>,
        url: &str,
        auth_key: AuthKey,
    ) -> SyncResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| SyncError::Config(format!("Invalid peer URL `{}`: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "Peer URL must be http or https, got `{}`",
                url.scheme()
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            url,
            auth_key,
            pull_rules: SyncRules::default(),
            push_rules: SyncRules::default(),
        })
    }

    pub fn with_pull_rules(mut self, rules: SyncRules) -> Self {
        self.pull_rules = rules;
        self
    }

    pub fn with_push_rules(mut self, rules: SyncRules) -> Self {
        self.push_rules = rules;
        self
    }

    /// Absolute URL for a path relative to the peer's base URL
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.id, self.name, self.url)
    }
}
